use super::registration::{EntryFn, Registration, Ticker, Trigger};
use crate::error::Result;
use crate::runtime::Handle;
use crate::runtime::task::LocalBoxFuture;

use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// A task driven by a one-shot or periodic timer.
///
/// Once started, the timer fires after `first`; the first firing spawns
/// `entry(ticker, args)`. The task then calls [`Ticker::next`] to wait for
/// each further firing, `repeat` after the call. With a zero `repeat` the
/// timer deactivates after each firing and fires again only after
/// [`start`](Self::start).
///
/// The registration ends when the task returns or when the timer is
/// closed. Dropping the `Timer` value does neither.
///
/// # Examples
///
/// ```rust,ignore
/// let timer = Timer::new(
///     &handle,
///     Duration::ZERO,
///     Duration::from_millis(100),
///     |ticker, label: &'static str| async move {
///         loop {
///             tracing::info!(label, "tick");
///             ticker.next().await?;
///         }
///     },
///     "heartbeat",
/// );
/// timer.start()?;
/// ```
#[derive(Clone)]
pub struct Timer {
    registration: Rc<Registration>,
}

impl Timer {
    pub fn new<F, Fut, A>(handle: &Handle, first: Duration, repeat: Duration, entry: F, args: A) -> Self
    where
        F: FnOnce(Ticker, A) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
        A: 'static,
    {
        let entry: EntryFn = Box::new(move |ticker: Ticker| -> LocalBoxFuture<Result<()>> {
            Box::pin(entry(ticker, args))
        });

        Self {
            registration: Registration::new(handle, Trigger::After { first, repeat }, entry),
        }
    }

    /// Arms the timer.
    ///
    /// Fails with [`Error::Closed`](crate::Error::Closed) once the timer
    /// was closed or its task has returned.
    pub fn start(&self) -> Result<()> {
        self.registration.start()
    }

    /// Disarms the timer; a parked task waits until the next `start`.
    pub fn stop(&self) {
        self.registration.stop();
    }

    /// Disarms the timer for good and resumes a parked task with
    /// [`Error::Closed`](crate::Error::Closed).
    pub fn close(&self) {
        self.registration.close();
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }
}
