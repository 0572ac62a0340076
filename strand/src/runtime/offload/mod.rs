//! Worker pool for blocking closures.
//!
//! [`Handle::spawn_blocking`](crate::Handle::spawn_blocking) moves a
//! closure to one of these threads and suspends the calling task. The
//! worker sends the result through a channel and wakes the loop's poller;
//! the loop then resumes the task on its own thread. Worker threads never
//! see tasks, connections or any other loop state.

mod injector;
mod job;
mod worker;

pub(crate) use job::{Completion, Job, Outcome, Payload};

use injector::Injector;
use worker::Worker;

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Fixed-size pool of offload threads.
pub(crate) struct OffloadPool {
    injector: Arc<Injector>,
    handles: Vec<JoinHandle<()>>,
}

impl OffloadPool {
    /// Starts `threads` workers.
    pub(crate) fn new(threads: usize) -> io::Result<Self> {
        let injector = Arc::new(Injector::new());
        let mut handles = Vec::with_capacity(threads);

        for id in 0..threads {
            let worker = Worker::new(id, injector.clone());

            let spawned = thread::Builder::new()
                .name(format!("strand-offload-{id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    let pool = Self { injector, handles };
                    drop(pool);
                    return Err(e);
                }
            }
        }

        debug!(threads, "offload pool started");

        Ok(Self { injector, handles })
    }

    pub(crate) fn submit(&self, job: Job) {
        self.injector.push(job);
    }
}

impl Drop for OffloadPool {
    /// Stops the workers and waits for jobs already running to finish.
    fn drop(&mut self) {
        self.injector.shutdown();

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
