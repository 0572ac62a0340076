use super::job::Job;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

/// Shared job queue of the offload pool.
///
/// The loop thread pushes jobs; worker threads block on the condition
/// variable until a job arrives or the pool shuts down.
pub(crate) struct Injector {
    /// Jobs waiting for a worker.
    queue: Mutex<VecDeque<Job>>,

    /// Wakes parked workers.
    condvar: Condvar,

    /// Set once the owning loop is dropped.
    shutdown: AtomicBool,
}

impl Injector {
    pub(crate) fn new() -> Self {
        Injector {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Signals shutdown and wakes all parked workers.
    ///
    /// Jobs still queued are dropped, which reports them as failed to the
    /// tasks that submitted them.
    pub(crate) fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);

        let abandoned: Vec<Job> = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        drop(abandoned);

        self.condvar.notify_all();
    }

    /// Queues a job and wakes one worker.
    ///
    /// After shutdown the job is dropped immediately.
    pub(crate) fn push(&self, job: Job) {
        if self.shutdown.load(Ordering::Acquire) {
            return;
        }

        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(job);
        self.condvar.notify_one();
    }

    /// Blocks until a job is available.
    ///
    /// Returns `None` once the pool is shutting down.
    pub(crate) fn next(&self) -> Option<Job> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }

            if let Some(job) = queue.pop_front() {
                return Some(job);
            }

            queue = self
                .condvar
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
