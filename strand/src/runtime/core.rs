use super::builder::{Config, LoopBuilder};
use super::context::{self, enter_context};
use super::offload::{Completion, Job, OffloadPool, Outcome, Payload};
use super::suspend::{Suspend, suspension};
use super::task::handle::{complete, join_slot};
use super::task::waker::{ReadyQueue, TaskWaker};
use super::task::{JoinHandle, LocalBoxFuture, Task, TaskState, catch_panic};
use crate::error::{Error, Result};
use crate::reactor::Reactor;
use crate::reactor::poller::Waker as PollerWaker;
use crate::utils::Slab;

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

type Continuation = Box<dyn FnOnce(Outcome)>;

/// Offload bookkeeping on the loop side.
struct Offload {
    /// Started on the first `spawn_blocking`.
    pool: Option<OffloadPool>,

    sender: Sender<Completion>,
    receiver: Receiver<Completion>,

    /// Continuations of jobs still in flight, keyed by job id.
    pending: Slab<Continuation>,
}

/// State shared by an [`EventLoop`] and its [`Handle`]s.
pub(crate) struct Core {
    pub(crate) config: Config,
    pub(crate) reactor: RefCell<Reactor>,

    tasks: RefCell<Slab<Task>>,
    ready: Arc<ReadyQueue>,
    poller_waker: Arc<PollerWaker>,

    offload: RefCell<Offload>,

    /// Receive buffer shared by all connections of this loop.
    pub(crate) scratch: RefCell<Vec<u8>>,

    running: Cell<bool>,
    stopping: Cell<bool>,
}

impl Core {
    fn new(config: Config) -> Result<Self> {
        let reactor = Reactor::new(config.event_capacity)?;
        let poller_waker = reactor.waker();
        let (sender, receiver) = mpsc::channel();

        Ok(Self {
            scratch: RefCell::new(vec![0; config.read_chunk_size]),
            config,
            reactor: RefCell::new(reactor),
            tasks: RefCell::new(Slab::new(64)),
            ready: Arc::new(ReadyQueue::new(poller_waker.clone())),
            poller_waker,
            offload: RefCell::new(Offload {
                pool: None,
                sender,
                receiver,
                pending: Slab::new(8),
            }),
            running: Cell::new(false),
            stopping: Cell::new(false),
        })
    }

    /// Adds a task to the loop.
    ///
    /// With `immediate`, the task is polled right away instead of on the
    /// next pass; used when the engine hands a fresh task its first event
    /// (an accepted connection, a first timer tick).
    pub(crate) fn spawn(&self, future: LocalBoxFuture<Result<()>>, immediate: bool) -> usize {
        let id = {
            let mut tasks = self.tasks.borrow_mut();
            let id = tasks.vacant_key();
            let waker = Arc::new(TaskWaker::new(id, self.ready.clone()));

            tasks.insert(Task::new(future, waker))
        };

        trace!(task = id, immediate, "task spawned");

        if immediate {
            self.poll_task(id);
        } else if let Some(task) = self.tasks.borrow().get(id) {
            task.schedule();
        }

        id
    }

    fn poll_task(&self, id: usize) {
        let Some((mut future, waker)) = self.tasks.borrow_mut().get_mut(id).and_then(Task::begin_poll)
        else {
            return;
        };

        let mut cx = Context::from_waker(&waker);

        match future.as_mut().poll(&mut cx) {
            Poll::Pending => {
                if let Some(task) = self.tasks.borrow_mut().get_mut(id) {
                    task.suspend(future);
                }
            }
            Poll::Ready(result) => {
                let task = self.tasks.borrow_mut().remove(id);
                drop(task);
                drop(future);

                match result {
                    Ok(()) => trace!(task = id, "task completed"),
                    Err(e) => error!(task = id, error = %e, "task failed"),
                }
            }
        }
    }

    pub(crate) fn task_state(&self, id: usize) -> Option<TaskState> {
        self.tasks.borrow().get(id).map(|task| task.state)
    }

    /// Polls every task that was ready when the pass started.
    fn run_ready(&self) {
        let budget = self.ready.len();

        for _ in 0..budget {
            match self.ready.pop() {
                Some(id) => self.poll_task(id),
                None => break,
            }
        }
    }

    /// Queues `func` on the offload pool; `then` runs on the loop thread
    /// with its outcome.
    fn offload(&self, func: Box<dyn FnOnce() -> Payload + Send>, then: Continuation) -> Result<()> {
        let mut offload = self.offload.borrow_mut();

        if offload.pool.is_none() {
            offload.pool = Some(OffloadPool::new(self.config.offload_threads)?);
        }

        let id = offload.pending.insert(then);
        let job = Job::new(id, func, offload.sender.clone(), self.poller_waker.clone());

        if let Some(pool) = &offload.pool {
            pool.submit(job);
        }

        Ok(())
    }

    /// Resumes the tasks whose offloaded closures have finished.
    fn drain_completions(&self) {
        loop {
            let next = {
                let mut offload = self.offload.borrow_mut();

                let Ok(completion) = offload.receiver.try_recv() else {
                    break;
                };

                offload
                    .pending
                    .remove(completion.id)
                    .map(|then| (then, completion.outcome))
            };

            if let Some((then, outcome)) = next {
                then(outcome);
            }
        }
    }

    /// Returns `true` while something can still produce work.
    fn is_alive(&self) -> bool {
        !self.ready.is_empty()
            || self.reactor.borrow().is_alive()
            || !self.offload.borrow().pending.is_empty()
    }

    /// Drives the loop until `done` holds, [`stop`](Handle::stop) is
    /// called, or nothing is left to do.
    ///
    /// One pass:
    /// 1. poll the ready tasks,
    /// 2. resume tasks whose offloaded closures finished,
    /// 3. wait for I/O (not at all if tasks are ready or idle callbacks
    ///    are armed, at most until the next timer otherwise),
    /// 4. dispatch readiness to connections and listeners,
    /// 5. fire expired timers,
    /// 6. run idle callbacks if no task became ready.
    fn run_until(&self, done: &dyn Fn() -> bool) -> Result<()> {
        loop {
            self.run_ready();
            self.drain_completions();

            if done() || self.stopping.replace(false) {
                return Ok(());
            }

            if !self.is_alive() {
                trace!("event loop has no more work");
                return Ok(());
            }

            let timeout = if !self.ready.is_empty() || self.reactor.borrow().has_idle() {
                Some(Duration::ZERO)
            } else {
                self.reactor
                    .borrow_mut()
                    .next_deadline()
                    .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            };

            let ready = self.reactor.borrow_mut().poll(timeout)?;
            for (source, event) in ready {
                source.ready(event);
            }

            let expired = self.reactor.borrow_mut().expired(Instant::now());
            for callback in expired {
                callback();
            }

            if self.ready.is_empty() {
                let idle = self.reactor.borrow().idle_callbacks();
                for callback in idle {
                    callback();
                }
            }
        }
    }
}

/// A single-threaded event loop.
///
/// The loop owns the readiness poller, the timers, the idle callbacks, the
/// tasks spawned onto it and (once used) the offload pool. Everything it
/// drives runs on the thread that created it; only offloaded closures run
/// elsewhere.
///
/// Dropping the loop drops its pending tasks, which in turn closes the
/// connections and listeners they own.
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = EventLoop::new()?;
///
/// let answer = event_loop.block_on(async {
///     strand::time::sleep(Duration::from_millis(10)).await;
///     42
/// });
/// ```
pub struct EventLoop {
    core: Rc<Core>,
}

impl EventLoop {
    /// Creates a loop with default settings.
    pub fn new() -> Result<Self> {
        LoopBuilder::new().build()
    }

    /// Returns a builder to customize the loop.
    pub fn builder() -> LoopBuilder {
        LoopBuilder::new()
    }

    pub(crate) fn with_config(config: Config) -> Result<Self> {
        let core = Core::new(config)?;
        debug!("event loop created");

        Ok(Self {
            core: Rc::new(core),
        })
    }

    /// Returns a cloneable handle to this loop.
    pub fn handle(&self) -> Handle {
        Handle {
            core: Rc::downgrade(&self.core),
        }
    }

    /// Spawns a task; see [`Handle::spawn`].
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        self.handle().spawn(future)
    }

    /// Runs the loop until it has no more work or is stopped.
    ///
    /// The loop has work while a task is ready, a connection or listener
    /// waits for readiness, a timer or idle callback is armed, or an
    /// offloaded closure is in flight.
    ///
    /// # Panics
    ///
    /// Panics if the loop is already running.
    pub fn run(&self) -> Result<()> {
        self.drive(&|| false)
    }

    /// Runs `future` to completion on this loop and returns its output.
    ///
    /// Other tasks make progress while `future` is pending.
    ///
    /// # Panics
    ///
    /// Panics if the loop is already running, if `future` panics, or if
    /// the loop runs out of work while `future` is still pending (nothing
    /// could ever wake it).
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let handle = self.spawn(future);

        if let Err(e) = self.drive(&|| handle.is_finished()) {
            panic!("event loop failed: {e}");
        }

        match handle.try_take() {
            Some(Ok(value)) => value,
            Some(Err(e)) => panic!("block_on future failed: {e}"),
            None => panic!("event loop ran out of work before the block_on future completed"),
        }
    }

    /// Makes the running loop return after its current pass; see
    /// [`Handle::stop`].
    pub fn stop(&self) {
        self.core.stopping.set(true);
    }

    fn drive(&self, done: &dyn Fn() -> bool) -> Result<()> {
        struct Running<'a>(&'a Cell<bool>);

        impl Drop for Running<'_> {
            fn drop(&mut self) {
                self.0.set(false);
            }
        }

        if self.core.running.replace(true) {
            panic!("event loop is already running on this thread");
        }
        let _running = Running(&self.core.running);

        enter_context(self.handle(), || self.core.run_until(done))
    }
}

impl Drop for EventLoop {
    /// Drops pending tasks and stops the offload pool.
    ///
    /// Tasks are taken out of the table before being dropped, so their
    /// destructors can still reach the loop.
    fn drop(&mut self) {
        let tasks = self.core.tasks.borrow_mut().drain();
        let abandoned = tasks.len();
        drop(tasks);

        // Joining the pool fails every queued job with `Error::Offload`;
        // their completions are delivered before the leftovers are dropped.
        let pool = self.core.offload.borrow_mut().pool.take();
        drop(pool);
        self.core.drain_completions();

        let pending = self.core.offload.borrow_mut().pending.drain();
        drop(pending);

        debug!(abandoned, "event loop dropped");
    }
}

/// A cloneable reference to an [`EventLoop`].
///
/// Handles do not keep the loop alive: once the loop is dropped, every
/// operation started through a handle fails with [`Error::LoopClosed`].
#[derive(Clone)]
pub struct Handle {
    core: Weak<Core>,
}

impl Handle {
    /// Returns the loop currently running on this thread.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a running event loop.
    pub fn current() -> Handle {
        context::current().expect("Handle::current must be called from within a running event loop")
    }

    /// Returns the loop currently running on this thread, if any.
    pub fn try_current() -> Option<Handle> {
        context::current()
    }

    pub(crate) fn core(&self) -> Result<Rc<Core>> {
        self.core.upgrade().ok_or(Error::LoopClosed)
    }

    /// Returns `true` once the loop has been dropped.
    pub fn is_closed(&self) -> bool {
        self.core.strong_count() == 0
    }

    /// Spawns a task onto the loop.
    ///
    /// The task starts on the next pass of the loop. Its output, or
    /// [`Error::Panicked`] if it panics, is available through the
    /// returned [`JoinHandle`]. A panicking task is logged and does not
    /// affect the loop or other tasks.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + 'static,
        F::Output: 'static,
    {
        let slot = join_slot();
        let result = slot.clone();

        let body = async move {
            match catch_panic(future).await {
                Ok(value) => {
                    complete(&result, Ok(value));
                    Ok(())
                }
                Err(message) => {
                    complete(&result, Err(Error::Panicked(message.clone())));
                    Err(Error::Panicked(message))
                }
            }
        };

        let id = match self.core() {
            Ok(core) => core.spawn(Box::pin(body), false),
            Err(_) => usize::MAX,
        };

        JoinHandle {
            id,
            handle: self.clone(),
            slot,
        }
    }

    /// Spawns an engine task whose error is logged by the loop.
    pub(crate) fn spawn_local(
        &self,
        future: LocalBoxFuture<Result<()>>,
        immediate: bool,
    ) -> Result<usize> {
        Ok(self.core()?.spawn(future, immediate))
    }

    pub(crate) fn task_state(&self, id: usize) -> Option<TaskState> {
        self.core().ok()?.task_state(id)
    }

    /// Runs a blocking closure on the offload pool and suspends the
    /// calling task until it returns.
    ///
    /// The closure runs on another thread and must not touch loop state;
    /// its return value is handed back to the awaiting task on the loop
    /// thread. A panic inside the closure resolves to [`Error::Offload`].
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let digest = handle.spawn_blocking(move || expensive_hash(&data)).await?;
    /// ```
    pub fn spawn_blocking<F, T>(&self, func: F) -> Suspend<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let core = match self.core() {
            Ok(core) => core,
            Err(e) => return Suspend::ready(Err(e)),
        };

        let (resumer, suspend) = suspension::<T>();

        let then: Continuation = Box::new(move |outcome: Outcome| {
            let result = match outcome {
                Ok(payload) => payload
                    .downcast::<T>()
                    .map(|value| *value)
                    .map_err(|_| Error::Offload("offloaded closure returned an unexpected type".into())),
                Err(message) => Err(Error::Offload(message)),
            };
            resumer.resume(result);
        });

        let func: Box<dyn FnOnce() -> Payload + Send> = Box::new(move || Box::new(func()) as Payload);

        match core.offload(func, then) {
            Ok(()) => suspend,
            Err(e) => Suspend::ready(Err(e)),
        }
    }

    /// Makes the running loop return after its current pass.
    pub fn stop(&self) {
        if let Ok(core) = self.core() {
            core.stopping.set(true);
        }
    }
}
