//! One-shot suspension points.
//!
//! Every place where a task waits on the engine (a read, a waiting send,
//! a timer tick, an offloaded closure) is expressed as a pair:
//!
//! - a [`Resumer`], held by whichever engine component will produce the
//!   result (a connection's pending-read slot, a write job, a timer), and
//! - a [`Suspend`], the future the task awaits.
//!
//! `Resumer::resume` consumes the resumer, so a suspended task can be
//! resumed at most once. Taking the resumer out of its slot
//! (`Option::take`) is the same operation as clearing the waiter, which is
//! what makes duplicate events harmless. A resumer dropped without being
//! used resumes its task with [`Error::Closed`], so no task is ever left
//! parked on a registration that no longer exists.

use crate::error::{Error, Result};

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

enum Slot<T> {
    /// Nothing delivered yet; holds the waker of the last poll.
    Waiting(Option<Waker>),

    /// A result is waiting to be picked up.
    Resumed(Result<T>),

    /// The result has been returned to the task.
    Taken,
}

type Shared<T> = Rc<RefCell<Slot<T>>>;

/// Creates a connected resumer / suspend pair.
pub(crate) fn suspension<T>() -> (Resumer<T>, Suspend<T>) {
    let shared = Rc::new(RefCell::new(Slot::Waiting(None)));

    (
        Resumer {
            slot: Some(shared.clone()),
        },
        Suspend {
            inner: Inner::Waiting(shared),
        },
    )
}

/// The right to resume one suspended task.
pub(crate) struct Resumer<T> {
    slot: Option<Shared<T>>,
}

impl<T> Resumer<T> {
    /// Delivers `value` and wakes the suspended task.
    pub(crate) fn resume(mut self, value: Result<T>) {
        if let Some(slot) = self.slot.take() {
            deliver(&slot, value);
        }
    }

    /// Returns `true` once the awaiting [`Suspend`] has been dropped.
    ///
    /// Nobody will observe a result delivered to an abandoned resumer.
    pub(crate) fn is_abandoned(&self) -> bool {
        self.slot
            .as_ref()
            .map(|slot| Rc::strong_count(slot) == 1)
            .unwrap_or(true)
    }
}

impl<T> Drop for Resumer<T> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            deliver(&slot, Err(Error::Closed));
        }
    }
}

fn deliver<T>(slot: &Shared<T>, value: Result<T>) {
    let waker = {
        let mut slot = slot.borrow_mut();

        match std::mem::replace(&mut *slot, Slot::Resumed(value)) {
            Slot::Waiting(waker) => waker,
            previous => {
                // Already resumed; keep the first result.
                *slot = previous;
                None
            }
        }
    };

    if let Some(waker) = waker {
        waker.wake();
    }
}

enum Inner<T> {
    Ready(Option<Result<T>>),
    Waiting(Shared<T>),
}

/// A future resolving once the engine resumes the task.
///
/// Returned by every suspension point of the crate: reads, waiting sends,
/// timer and idle ticks, idle-worker splits, sleeps and offloaded
/// closures. Operations that can answer immediately (a zero-length read,
/// a read already satisfied by buffered data, a synchronous error) return
/// an already-resolved `Suspend`, so awaiting it never parks the task.
#[must_use = "a Suspend does nothing unless awaited"]
pub struct Suspend<T> {
    inner: Inner<T>,
}

impl<T> Suspend<T> {
    /// A suspension point that resolves on first poll.
    pub(crate) fn ready(value: Result<T>) -> Self {
        Self {
            inner: Inner::Ready(Some(value)),
        }
    }

    /// Returns `true` if awaiting this value will not park the task.
    pub fn is_ready(&self) -> bool {
        match &self.inner {
            Inner::Ready(value) => value.is_some(),
            Inner::Waiting(slot) => matches!(&*slot.borrow(), Slot::Resumed(_)),
        }
    }
}

impl<T> Unpin for Suspend<T> {}

impl<T> Future for Suspend<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match &mut this.inner {
            Inner::Ready(value) => match value.take() {
                Some(value) => Poll::Ready(value),
                None => panic!("Suspend polled after completion"),
            },
            Inner::Waiting(slot) => {
                let mut slot = slot.borrow_mut();

                match std::mem::replace(&mut *slot, Slot::Taken) {
                    Slot::Resumed(value) => Poll::Ready(value),
                    Slot::Waiting(_) => {
                        *slot = Slot::Waiting(Some(cx.waker().clone()));
                        Poll::Pending
                    }
                    Slot::Taken => panic!("Suspend polled after completion"),
                }
            }
        }
    }
}
