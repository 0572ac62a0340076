use crate::reactor::poller::Waker as PollerWaker;

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{RawWaker, RawWakerVTable, Waker};
use std::thread::{self, ThreadId};

/// Ids of tasks waiting to be polled by the loop.
///
/// Wakers may be cloned into other threads (an offloaded closure can
/// capture one), so the queue is thread-safe. A wake coming from a thread
/// other than the loop's also interrupts the poller.
pub(crate) struct ReadyQueue {
    queue: Mutex<VecDeque<usize>>,
    poller: Arc<PollerWaker>,
    owner: ThreadId,
}

impl ReadyQueue {
    pub(crate) fn new(poller: Arc<PollerWaker>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            poller,
            owner: thread::current().id(),
        }
    }

    pub(crate) fn push(&self, id: usize) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(id);

        if thread::current().id() != self.owner {
            self.poller.wake();
        }
    }

    pub(crate) fn pop(&self) -> Option<usize> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-task wake state.
///
/// `queued` deduplicates wakes: a task woken several times before it runs
/// is queued once.
pub(crate) struct TaskWaker {
    id: usize,
    queued: AtomicBool,
    ready: Arc<ReadyQueue>,
}

impl TaskWaker {
    pub(crate) fn new(id: usize, ready: Arc<ReadyQueue>) -> Self {
        Self {
            id,
            queued: AtomicBool::new(false),
            ready,
        }
    }

    /// Queues the task unless it is already queued.
    pub(crate) fn schedule(&self) {
        if !self.queued.swap(true, Ordering::AcqRel) {
            self.ready.push(self.id);
        }
    }

    /// Called by the loop right before polling the task.
    pub(crate) fn clear(&self) {
        self.queued.store(false, Ordering::Release);
    }
}

/// Returns the `RawWakerVTable` shared by all task wakers.
///
/// # Safety
///
/// Every function in the vtable receives a pointer produced by
/// `Arc::<TaskWaker>::into_raw` and keeps the reference count balanced.
fn vtable() -> &'static RawWakerVTable {
    &RawWakerVTable::new(clone_raw, wake_raw, wake_by_ref_raw, drop_raw)
}

/// Creates a [`Waker`] that queues the task on the loop when woken.
pub(crate) fn make_waker(task: Arc<TaskWaker>) -> Waker {
    unsafe {
        Waker::from_raw(RawWaker::new(
            Arc::into_raw(task) as *const (),
            vtable(),
        ))
    }
}

fn clone_raw(ptr: *const ()) -> RawWaker {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    let cloned = arc.clone();
    mem::forget(arc);

    RawWaker::new(Arc::into_raw(cloned) as *const (), vtable())
}

fn wake_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    arc.schedule();
}

fn wake_by_ref_raw(ptr: *const ()) {
    let arc = unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
    arc.schedule();
    mem::forget(arc);
}

fn drop_raw(ptr: *const ()) {
    unsafe { Arc::<TaskWaker>::from_raw(ptr as *const TaskWaker) };
}
