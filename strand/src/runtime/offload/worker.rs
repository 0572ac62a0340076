use super::injector::Injector;

use std::sync::Arc;
use tracing::trace;

/// A thread of the offload pool.
///
/// Workers never touch loop state: they run jobs and hand the results
/// back through the completion channel.
pub(crate) struct Worker {
    id: usize,
    injector: Arc<Injector>,
}

impl Worker {
    pub(crate) fn new(id: usize, injector: Arc<Injector>) -> Self {
        Self { id, injector }
    }

    /// Runs jobs until the pool shuts down.
    pub(crate) fn run(&self) {
        trace!(worker = self.id, "offload worker started");

        while let Some(job) = self.injector.next() {
            job.run();
        }

        trace!(worker = self.id, "offload worker stopped");
    }
}
