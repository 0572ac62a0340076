//! Shared machinery of [`Timer`](super::Timer) and [`Idle`](super::Idle).
//!
//! A registration binds one task to a trigger. The task is spawned on the
//! first firing with the arguments given at creation; afterwards it waits
//! for further firings through [`Ticker::next`]. The trigger is re-armed
//! only when the task asks for the next tick, so a slow task is never
//! fired twice concurrently and periodic firings are spaced at least one
//! interval after the previous one was acknowledged.

use crate::error::{Error, Result};
use crate::runtime::Handle;
use crate::runtime::Suspend;
use crate::runtime::suspend::{Resumer, suspension};
use crate::runtime::task::{LocalBoxFuture, guarded};

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

pub(crate) type EntryFn = Box<dyn FnOnce(Ticker) -> LocalBoxFuture<Result<()>>>;

/// What fires a registration.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Trigger {
    /// After `first`, then `repeat` after each acknowledgment. A zero
    /// `repeat` fires once per `start`.
    After { first: Duration, repeat: Duration },

    /// Whenever the loop has nothing else to do.
    Idle,
}

struct State {
    active: bool,
    closed: bool,

    /// The bound task ran to completion.
    finished: bool,

    /// The task has not been spawned yet.
    first_run: bool,

    /// Reactor key of the armed timer or idle callback.
    armed: Option<usize>,

    entry: Option<EntryFn>,

    /// The bound task, parked in `Ticker::next`.
    waiter: Option<Resumer<()>>,
}

pub(crate) struct Registration {
    handle: Handle,
    trigger: Trigger,
    state: RefCell<State>,
}

impl Registration {
    pub(crate) fn new(handle: &Handle, trigger: Trigger, entry: EntryFn) -> Rc<Self> {
        Rc::new(Self {
            handle: handle.clone(),
            trigger,
            state: RefCell::new(State {
                active: false,
                closed: false,
                finished: false,
                first_run: true,
                armed: None,
                entry: Some(entry),
                waiter: None,
            }),
        })
    }

    pub(crate) fn start(self: &Rc<Self>) -> Result<()> {
        let mut state = self.state.borrow_mut();

        if state.closed || state.finished {
            return Err(Error::Closed);
        }

        // A running task re-arms through `next`.
        if state.armed.is_none() && (state.first_run || state.waiter.is_some()) {
            self.arm(&mut state, self.first_delay())?;
        }

        state.active = true;
        Ok(())
    }

    pub(crate) fn stop(&self) {
        let mut state = self.state.borrow_mut();

        state.active = false;
        self.disarm(&mut state);
    }

    /// Stops the registration for good and resumes a parked task with
    /// [`Error::Closed`].
    pub(crate) fn close(&self) {
        let (waiter, entry) = {
            let mut state = self.state.borrow_mut();

            if state.closed {
                return;
            }

            state.closed = true;
            state.active = false;
            self.disarm(&mut state);

            (state.waiter.take(), state.entry.take())
        };

        drop(entry);
        if let Some(waiter) = waiter {
            waiter.resume(Err(Error::Closed));
        }

        trace!(trigger = ?self.trigger, "registration closed");
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Suspends the bound task until the next firing.
    pub(crate) fn next(self: &Rc<Self>) -> Suspend<()> {
        let mut state = self.state.borrow_mut();

        if state.closed {
            return Suspend::ready(Err(Error::Closed));
        }

        let (resumer, suspend) = suspension();
        state.waiter = Some(resumer);

        if state.active && state.armed.is_none() {
            if let Err(e) = self.arm(&mut state, self.repeat_delay()) {
                state.waiter = None;
                return Suspend::ready(Err(e));
            }
        }

        suspend
    }

    fn first_delay(&self) -> Duration {
        match self.trigger {
            Trigger::After { first, .. } => first,
            Trigger::Idle => Duration::ZERO,
        }
    }

    fn repeat_delay(&self) -> Duration {
        match self.trigger {
            Trigger::After { first, repeat } if repeat.is_zero() => first,
            Trigger::After { repeat, .. } => repeat,
            Trigger::Idle => Duration::ZERO,
        }
    }

    fn arm(self: &Rc<Self>, state: &mut State, delay: Duration) -> Result<()> {
        let core = self.handle.core()?;
        let this = self.clone();
        let callback = Rc::new(move || this.fire());

        let mut reactor = core.reactor.borrow_mut();
        let key = match self.trigger {
            Trigger::After { .. } => reactor.arm_timer(Instant::now() + delay, callback),
            Trigger::Idle => reactor.arm_idle(callback),
        };

        state.armed = Some(key);
        Ok(())
    }

    fn disarm(&self, state: &mut State) {
        let Some(key) = state.armed.take() else {
            return;
        };

        let Ok(core) = self.handle.core() else {
            return;
        };

        if let Ok(mut reactor) = core.reactor.try_borrow_mut() {
            match self.trigger {
                Trigger::After { .. } => reactor.disarm_timer(key),
                Trigger::Idle => reactor.disarm_idle(key),
            }
        }
    }

    fn fire(self: &Rc<Self>) {
        let mut state = self.state.borrow_mut();

        match self.trigger {
            // Timers are one-shot in the reactor.
            Trigger::After { .. } => state.armed = None,
            Trigger::Idle => self.disarm(&mut state),
        }

        if !state.active || state.closed {
            return;
        }

        if let Trigger::After { repeat, .. } = self.trigger {
            if repeat.is_zero() {
                state.active = false;
            }
        }

        if state.first_run {
            state.first_run = false;

            let Some(entry) = state.entry.take() else {
                return;
            };

            drop(state);
            self.launch(entry);
        } else if let Some(waiter) = state.waiter.take() {
            drop(state);
            waiter.resume(Ok(()));
        }
    }

    /// Spawns the bound task and runs it up to its first suspension.
    fn launch(self: &Rc<Self>, entry: EntryFn) {
        let ticker = Ticker {
            registration: self.clone(),
        };
        let this = self.clone();

        let task = async move {
            let result = guarded(entry(ticker)).await;
            this.finish();
            result
        };

        if let Err(e) = self.handle.spawn_local(Box::pin(task), true) {
            warn!(error = %e, "failed to spawn registration task");
        }
    }

    /// Deactivates the registration once its task has returned.
    fn finish(&self) {
        let waiter = {
            let mut state = self.state.borrow_mut();

            state.finished = true;
            state.active = false;
            self.disarm(&mut state);

            state.waiter.take()
        };

        drop(waiter);
    }
}

/// The bound task's view of its [`Timer`](super::Timer) or
/// [`Idle`](super::Idle).
///
/// Passed to the entry function on the first firing.
#[derive(Clone)]
pub struct Ticker {
    registration: Rc<Registration>,
}

impl Ticker {
    /// Waits for the next firing.
    ///
    /// Re-arms the trigger: a repeating timer fires again `repeat` after
    /// this call. While the registration is stopped, the task stays parked
    /// until it is started again. Resolves with [`Error::Closed`] once
    /// the registration is closed.
    pub fn next(&self) -> Suspend<()> {
        self.registration.next()
    }

    pub fn start(&self) -> Result<()> {
        self.registration.start()
    }

    pub fn stop(&self) {
        self.registration.stop();
    }

    pub fn close(&self) {
        self.registration.close();
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_active()
    }
}
