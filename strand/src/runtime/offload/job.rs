use crate::error::panic_message;
use crate::reactor::poller::Waker;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::Sender;

/// Type-erased value produced by an offloaded closure.
pub(crate) type Payload = Box<dyn Any + Send>;

/// Result of one job, as handed back to the loop thread.
pub(crate) type Outcome = Result<Payload, String>;

/// A completion travelling from a worker back to the loop.
pub(crate) struct Completion {
    /// Key of the waiting continuation on the loop side.
    pub(crate) id: usize,
    pub(crate) outcome: Outcome,
}

/// A closure queued for the offload pool.
///
/// Every job reports exactly one [`Completion`]: either the value (or
/// panic message) of the closure once a worker ran it, or a failure from
/// `Drop` if the job is discarded before running.
pub(crate) struct Job {
    id: usize,
    func: Option<Box<dyn FnOnce() -> Payload + Send>>,
    completions: Sender<Completion>,
    waker: Arc<Waker>,
}

impl Job {
    pub(crate) fn new(
        id: usize,
        func: Box<dyn FnOnce() -> Payload + Send>,
        completions: Sender<Completion>,
        waker: Arc<Waker>,
    ) -> Self {
        Self {
            id,
            func: Some(func),
            completions,
            waker,
        }
    }

    /// Runs the closure on the current (worker) thread.
    pub(crate) fn run(mut self) {
        let Some(func) = self.func.take() else {
            return;
        };

        let outcome = catch_unwind(AssertUnwindSafe(func)).map_err(|p| panic_message(&*p));
        self.complete(outcome);
    }

    fn complete(&self, outcome: Outcome) {
        // The loop may already be gone; nobody is waiting then.
        let _ = self.completions.send(Completion {
            id: self.id,
            outcome,
        });
        self.waker.wake();
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        if self.func.take().is_some() {
            self.complete(Err("worker pool shut down before the job ran".to_string()));
        }
    }
}
