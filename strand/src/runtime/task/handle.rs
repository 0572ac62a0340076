use super::state::TaskState;
use crate::error::Result;
use crate::runtime::Handle;

use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Result slot shared between a task and its [`JoinHandle`].
pub(crate) struct JoinSlot<T> {
    result: Option<Result<T>>,
    finished: Option<TaskState>,
    waker: Option<Waker>,
}

pub(crate) type SharedSlot<T> = Rc<RefCell<JoinSlot<T>>>;

pub(crate) fn join_slot<T>() -> SharedSlot<T> {
    Rc::new(RefCell::new(JoinSlot {
        result: None,
        finished: None,
        waker: None,
    }))
}

/// Stores the task result and wakes whoever awaits the handle.
pub(crate) fn complete<T>(slot: &SharedSlot<T>, result: Result<T>) {
    let waker = {
        let mut slot = slot.borrow_mut();

        slot.finished = Some(if result.is_ok() {
            TaskState::Completed
        } else {
            TaskState::Failed
        });
        slot.result = Some(result);
        slot.waker.take()
    };

    if let Some(waker) = waker {
        waker.wake();
    }
}

/// A handle to a spawned task.
///
/// A `JoinHandle` allows awaiting the result of a task spawned onto the
/// loop. It implements [`Future`] and resolves once the task has
/// finished: `Ok(value)` if it returned, [`Error::Panicked`] if it
/// panicked, [`Error::LoopClosed`] if the loop was dropped first.
///
/// Dropping the `JoinHandle` does **not** cancel the task; it only
/// discards the ability to observe its result.
///
/// [`Error::Panicked`]: crate::Error::Panicked
/// [`Error::LoopClosed`]: crate::Error::LoopClosed
pub struct JoinHandle<T> {
    pub(crate) id: usize,
    pub(crate) handle: Handle,
    pub(crate) slot: SharedSlot<T>,
}

impl<T> JoinHandle<T> {
    /// Returns the current lifecycle state of the task.
    pub fn state(&self) -> TaskState {
        if let Some(state) = self.slot.borrow().finished {
            return state;
        }

        self.handle
            .task_state(self.id)
            .unwrap_or(TaskState::Failed)
    }

    /// Returns `true` once the task has completed or failed.
    pub fn is_finished(&self) -> bool {
        self.slot.borrow().finished.is_some()
    }

    /// Takes the result if the task has finished.
    pub(crate) fn try_take(&self) -> Option<Result<T>> {
        self.slot.borrow_mut().result.take()
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();

        if let Some(result) = slot.result.take() {
            return Poll::Ready(result);
        }

        if slot.finished.is_some() {
            panic!("JoinHandle polled after completion");
        }

        if self.handle.is_closed() {
            return Poll::Ready(Err(crate::Error::LoopClosed));
        }

        slot.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}
