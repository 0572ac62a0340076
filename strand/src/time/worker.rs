//! A chain of work run one step per idle pass.

use crate::error::{Error, Result};
use crate::runtime::Handle;
use crate::runtime::Suspend;
use crate::runtime::suspend::{Resumer, suspension};
use crate::runtime::task::{LocalBoxFuture, guarded};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use tracing::{debug, warn};

type SpawnFn = Box<dyn FnOnce() -> LocalBoxFuture<Result<()>>>;

enum Continuation {
    /// A registered closure; its future becomes a fresh task.
    Spawn(SpawnFn),

    /// A task parked in [`IdleWorker::split`].
    Resume(Resumer<()>),
}

struct State {
    chain: VecDeque<Continuation>,
    armed: Option<usize>,
    closed: bool,
}

struct Inner {
    handle: Handle,
    state: RefCell<State>,
}

/// Runs queued continuations when the loop is idle, one per idle pass.
///
/// [`register`](Self::register) appends a closure that is spawned as a
/// task when its turn comes. [`split`](Self::split) appends the calling
/// task itself: it is parked and resumed when its turn comes, which lets a
/// long computation give way to I/O between steps.
///
/// The worker is active while its chain is non-empty.
///
/// # Examples
///
/// ```rust,ignore
/// let worker = IdleWorker::new(&handle);
///
/// for chunk in rows.chunks(64) {
///     index(chunk);
///     worker.split().await?;
/// }
/// ```
#[derive(Clone)]
pub struct IdleWorker {
    inner: Rc<Inner>,
}

impl IdleWorker {
    pub fn new(handle: &Handle) -> Self {
        Self {
            inner: Rc::new(Inner {
                handle: handle.clone(),
                state: RefCell::new(State {
                    chain: VecDeque::new(),
                    armed: None,
                    closed: false,
                }),
            }),
        }
    }

    /// Appends a closure to the chain.
    ///
    /// Fails with [`Error::Closed`] once the worker was closed.
    pub fn register<F, Fut>(&self, func: F) -> Result<()>
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        let func: SpawnFn = Box::new(move || -> LocalBoxFuture<Result<()>> { Box::pin(func()) });
        self.inner.push(Continuation::Spawn(func))
    }

    /// Appends the calling task to the chain and parks it until its turn.
    pub fn split(&self) -> Suspend<()> {
        let (resumer, suspend) = suspension();

        match self.inner.push(Continuation::Resume(resumer)) {
            Ok(()) => suspend,
            Err(e) => Suspend::ready(Err(e)),
        }
    }

    /// Discards the chain without running it.
    ///
    /// Parked [`split`](Self::split) callers are resumed with
    /// [`Error::Closed`]. Later registrations fail.
    pub fn close(&self) {
        let chain = {
            let mut state = self.inner.state.borrow_mut();

            state.closed = true;
            self.inner.disarm(&mut state);

            std::mem::take(&mut state.chain)
        };

        debug!(discarded = chain.len(), "idle worker closed");
        drop(chain);
    }

    /// Returns `true` while continuations are waiting for an idle pass.
    pub fn is_active(&self) -> bool {
        self.inner.state.borrow().armed.is_some()
    }

    /// Number of continuations waiting in the chain.
    pub fn len(&self) -> usize {
        self.inner.state.borrow().chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn push(self: &Rc<Self>, continuation: Continuation) -> Result<()> {
        let mut state = self.state.borrow_mut();

        if state.closed {
            return Err(Error::Closed);
        }

        if state.armed.is_none() {
            let core = self.handle.core()?;
            let this = Rc::downgrade(self);

            let key = core.reactor.borrow_mut().arm_idle(Rc::new(move || {
                if let Some(this) = this.upgrade() {
                    this.step();
                }
            }));
            state.armed = Some(key);
        }

        state.chain.push_back(continuation);
        Ok(())
    }

    /// Runs the head of the chain.
    fn step(&self) {
        let next = {
            let mut state = self.state.borrow_mut();
            let next = state.chain.pop_front();

            if state.chain.is_empty() {
                self.disarm(&mut state);
            }

            next
        };

        match next {
            Some(Continuation::Spawn(func)) => {
                if let Err(e) = self.handle.spawn_local(Box::pin(guarded(func())), true) {
                    warn!(error = %e, "failed to spawn idle worker continuation");
                }
            }
            Some(Continuation::Resume(resumer)) => resumer.resume(Ok(())),
            None => {}
        }
    }

    fn disarm(&self, state: &mut State) {
        let Some(key) = state.armed.take() else {
            return;
        };

        if let Ok(core) = self.handle.core() {
            if let Ok(mut reactor) = core.reactor.try_borrow_mut() {
                reactor.disarm_idle(key);
            }
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        let key = state.armed.take();

        if let (Some(key), Ok(core)) = (key, self.handle.core()) {
            if let Ok(mut reactor) = core.reactor.try_borrow_mut() {
                reactor.disarm_idle(key);
            }
        }
    }
}
