use super::registration::{EntryFn, Registration, Ticker, Trigger};
use crate::error::Result;
use crate::runtime::Handle;
use crate::runtime::task::LocalBoxFuture;

use std::future::Future;
use std::rc::Rc;

/// A task driven by idle passes of the loop.
///
/// Behaves like a [`Timer`](super::Timer) whose trigger is "the loop has
/// no ready task" instead of a delay: the first idle pass after
/// [`start`](Self::start) spawns `entry(ticker, args)`, and every
/// [`Ticker::next`] waits for another idle pass.
#[derive(Clone)]
pub struct Idle {
    registration: Rc<Registration>,
}

impl Idle {
    pub fn new<F, Fut, A>(handle: &Handle, entry: F, args: A) -> Self
    where
        F: FnOnce(Ticker, A) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
        A: 'static,
    {
        let entry: EntryFn = Box::new(move |ticker: Ticker| -> LocalBoxFuture<Result<()>> {
            Box::pin(entry(ticker, args))
        });

        Self {
            registration: Registration::new(handle, Trigger::Idle, entry),
        }
    }

    pub fn start(&self) -> Result<()> {
        self.registration.start()
    }

    pub fn stop(&self) {
        self.registration.stop();
    }

    pub fn close(&self) {
        self.registration.close();
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }
}
