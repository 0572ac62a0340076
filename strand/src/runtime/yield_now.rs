use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future returning `Pending` once after re-queuing its task.
struct YieldOnce(bool);

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.0 {
            return Poll::Ready(());
        }

        self.0 = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Lets the other ready tasks of the loop run before continuing.
///
/// The task is queued behind every task that is already ready, so a long
/// computation split by `yield_now` cannot starve connections or timers.
/// For yielding only when the loop is otherwise idle, see
/// [`IdleWorker::split`](crate::time::IdleWorker::split).
pub async fn yield_now() {
    YieldOnce(false).await
}
