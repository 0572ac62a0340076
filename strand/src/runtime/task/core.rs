use super::state::TaskState;
use super::waker::{TaskWaker, make_waker};
use crate::error::{Result, panic_message};

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

/// A boxed future pinned to the loop thread.
pub(crate) type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// A spawned task owned by the loop.
///
/// The future is taken out of the task while it is being polled, so the
/// task can spawn other tasks (which borrows the task table) from inside
/// its own poll.
pub(crate) struct Task {
    /// The task body. `None` while the loop is polling it.
    future: Option<LocalBoxFuture<Result<()>>>,

    /// The current lifecycle state of the task.
    pub(crate) state: TaskState,

    /// Wake handle queuing this task on the loop.
    waker: Arc<TaskWaker>,
}

impl Task {
    pub(crate) fn new(future: LocalBoxFuture<Result<()>>, waker: Arc<TaskWaker>) -> Self {
        Self {
            future: Some(future),
            state: TaskState::Suspended,
            waker,
        }
    }

    /// Takes the body out for polling and marks the task running.
    ///
    /// Returns `None` if the task is already being polled.
    pub(crate) fn begin_poll(&mut self) -> Option<(LocalBoxFuture<Result<()>>, Waker)> {
        let future = self.future.take()?;

        self.state = TaskState::Running;
        self.waker.clear();

        Some((future, make_waker(self.waker.clone())))
    }

    /// Puts a still-pending body back.
    pub(crate) fn suspend(&mut self, future: LocalBoxFuture<Result<()>>) {
        self.future = Some(future);
        self.state = TaskState::Suspended;
    }

    /// Queues the task on the loop.
    pub(crate) fn schedule(&self) {
        self.waker.schedule();
    }
}

/// Future adapter turning a panic of `inner` into an `Err` carrying the
/// panic message.
pub(crate) struct CatchPanic<F> {
    inner: Pin<Box<F>>,
}

/// Wraps `future` so that a panic while polling it resolves the wrapper
/// instead of unwinding through the loop.
pub(crate) fn catch_panic<F: Future>(future: F) -> CatchPanic<F> {
    CatchPanic {
        inner: Box::pin(future),
    }
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = std::result::Result<F::Output, String>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.get_mut().inner;

        match catch_unwind(AssertUnwindSafe(|| inner.as_mut().poll(cx))) {
            Ok(Poll::Ready(value)) => Poll::Ready(Ok(value)),
            Ok(Poll::Pending) => Poll::Pending,
            Err(payload) => Poll::Ready(Err(panic_message(&*payload))),
        }
    }
}

/// Runs `future`, reporting a panic as [`Error::Panicked`].
///
/// [`Error::Panicked`]: crate::Error::Panicked
pub(crate) async fn guarded<F>(future: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    catch_panic(future)
        .await
        .unwrap_or_else(|message| Err(crate::Error::Panicked(message)))
}
