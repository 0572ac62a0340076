//! Task primitives.
//!
//! A task is a `'static` future owned by one event loop and always polled
//! on that loop's thread. This module contains:
//! - the task container and its lifecycle state,
//! - the waker queuing a task on its loop,
//! - join handles for awaiting task results,
//! - [`spawn`], which spawns onto the loop currently running.

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod state;
pub(crate) mod waker;

pub(crate) use self::core::{LocalBoxFuture, Task, catch_panic, guarded};
pub use handle::JoinHandle;
pub use state::TaskState;

use crate::runtime::Handle;

use std::future::Future;

/// Spawns a task onto the event loop running on this thread.
///
/// The task starts on the next pass of the loop.
///
/// # Panics
///
/// Panics if called outside of a running event loop.
///
/// # Examples
///
/// ```rust,ignore
/// let handle = strand::spawn(async { 40 + 2 });
/// assert_eq!(handle.await?, 42);
/// ```
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    Handle::current().spawn(future)
}
