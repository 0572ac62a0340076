/// Lifecycle of a task driven by the loop.
///
/// ```text
/// spawn ──► Suspended ──► Running ──► Completed
///              ▲             │  └───► Failed
///              └─────────────┘
/// ```
///
/// A freshly spawned task is `Suspended` with a wake already queued, so it
/// starts on the next pass of the loop (or immediately, for tasks spawned
/// by the engine itself such as connection handlers). It is `Running`
/// only while the loop polls it and goes back to `Suspended` when it waits
/// on a suspension point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Currently being polled by the loop.
    Running,

    /// Parked on a suspension point, or queued to run.
    Suspended,

    /// Returned normally.
    Completed,

    /// Panicked, or returned an error the engine acted on.
    Failed,
}

impl TaskState {
    /// Returns `true` once the task will never run again.
    pub fn is_finished(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}
