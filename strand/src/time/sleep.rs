use crate::runtime::Handle;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Creates a future that completes after the given duration.
///
/// The timer is armed on the loop running the task that first polls the
/// returned future.
///
/// # Panics
///
/// Panics if polled outside of a running event loop.
///
/// # Examples
///
/// ```rust,ignore
/// use std::time::Duration;
///
/// sleep(Duration::from_millis(10)).await;
/// ```
pub fn sleep(duration: Duration) -> Sleep {
    Sleep::new(None, duration)
}

impl Handle {
    /// Creates a future that completes after `duration`, timed by this
    /// loop.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(Some(self.clone()), duration)
    }
}

/// State shared between a [`Sleep`] and its reactor timer.
#[derive(Default)]
struct Wakeup {
    fired: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

/// A future that completes once a specific deadline is reached.
///
/// The timer is armed on first poll and disarmed if the future is
/// dropped before completion, so an abandoned `Sleep` neither wakes its
/// task nor keeps the loop alive.
pub struct Sleep {
    /// Absolute point in time when the sleep completes.
    deadline: Instant,

    /// Loop timing this sleep; the current loop if not given.
    handle: Option<Handle>,

    /// Reactor timer key once armed.
    key: Option<usize>,

    wakeup: Rc<Wakeup>,
}

impl Sleep {
    fn new(handle: Option<Handle>, duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
            handle,
            key: None,
            wakeup: Rc::new(Wakeup::default()),
        }
    }

    /// Returns the instant at which the sleep completes.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.wakeup.fired.get() || Instant::now() >= this.deadline {
            return Poll::Ready(());
        }

        this.wakeup.waker.replace(Some(cx.waker().clone()));

        if this.key.is_none() {
            let handle = this
                .handle
                .get_or_insert_with(Handle::current)
                .clone();

            let Ok(core) = handle.core() else {
                // The loop is gone; nothing can time this sleep anymore.
                return Poll::Ready(());
            };

            let wakeup = this.wakeup.clone();
            let key = core.reactor.borrow_mut().arm_timer(
                this.deadline,
                Rc::new(move || {
                    wakeup.fired.set(true);
                    if let Some(waker) = wakeup.waker.take() {
                        waker.wake();
                    }
                }),
            );

            this.key = Some(key);
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    /// Disarms the timer if the sleep is dropped before completion.
    fn drop(&mut self) {
        let (Some(key), Some(handle)) = (self.key, &self.handle) else {
            return;
        };

        if self.wakeup.fired.get() {
            return;
        }

        if let Ok(core) = handle.core() {
            if let Ok(mut reactor) = core.reactor.try_borrow_mut() {
                reactor.disarm_timer(key);
            }
        }
    }
}
