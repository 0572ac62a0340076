use super::event::Event;
use super::io::{IoEntry, IoSource};
use super::poller::{Interest, Poller, Waker};
use super::timer::TimerEntry;
use crate::utils::Slab;

use std::collections::BinaryHeap;
use std::io;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A callback run by the reactor on the loop thread.
pub(crate) type Callback = Rc<dyn Fn()>;

struct TimerSlot {
    seq: u64,
    callback: Callback,
}

/// Readiness, timer and idle bookkeeping for one event loop.
///
/// The reactor never runs user code while it is borrowed: [`poll`],
/// [`expired`] and [`idle_callbacks`] hand back what has to run, and the
/// loop invokes it after releasing the reactor.
///
/// [`poll`]: Reactor::poll
/// [`expired`]: Reactor::expired
/// [`idle_callbacks`]: Reactor::idle_callbacks
pub(crate) struct Reactor {
    poller: Poller,
    events: Vec<Event>,

    io: Slab<IoEntry>,

    timers: Slab<TimerSlot>,
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,

    idle: Slab<Callback>,
}

impl Reactor {
    pub(crate) fn new(event_capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poller: Poller::new(event_capacity)?,
            events: Vec::with_capacity(event_capacity),
            io: Slab::new(64),
            timers: Slab::new(16),
            heap: BinaryHeap::new(),
            next_seq: 0,
            idle: Slab::new(4),
        })
    }

    /// Returns a handle able to interrupt a blocked [`poll`](Self::poll)
    /// from any thread.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.poller.waker()
    }

    /// Registers `fd` and returns its token.
    pub(crate) fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        source: Weak<dyn IoSource>,
    ) -> io::Result<usize> {
        let token = self.io.vacant_key();
        self.poller.register(fd, token, interest)?;

        Ok(self.io.insert(IoEntry {
            fd,
            interest,
            source,
        }))
    }

    /// Changes the readiness requested for `token`.
    pub(crate) fn set_interest(&mut self, token: usize, interest: Interest) -> io::Result<()> {
        let Some(entry) = self.io.get_mut(token) else {
            return Ok(());
        };

        if entry.interest == interest {
            return Ok(());
        }

        self.poller.reregister(entry.fd, token, interest)?;
        entry.interest = interest;

        Ok(())
    }

    /// Removes a registration. The descriptor itself is left open.
    pub(crate) fn deregister(&mut self, token: usize) {
        if let Some(entry) = self.io.remove(token) {
            self.poller.deregister(entry.fd);
        }
    }

    /// Arms a one-shot timer firing at `deadline`.
    pub(crate) fn arm_timer(&mut self, deadline: Instant, callback: Callback) -> usize {
        let seq = self.next_seq;
        self.next_seq += 1;

        let key = self.timers.insert(TimerSlot { seq, callback });
        self.heap.push(TimerEntry { deadline, seq, key });

        key
    }

    /// Cancels a timer that has not fired yet.
    pub(crate) fn disarm_timer(&mut self, key: usize) {
        self.timers.remove(key);
    }

    /// Arms a callback run on every idle pass until disarmed.
    pub(crate) fn arm_idle(&mut self, callback: Callback) -> usize {
        self.idle.insert(callback)
    }

    pub(crate) fn disarm_idle(&mut self, key: usize) {
        self.idle.remove(key);
    }

    pub(crate) fn has_idle(&self) -> bool {
        !self.idle.is_empty()
    }

    /// Returns `true` while anything registered here can still produce
    /// work: a descriptor with a non-empty interest, a pending timer or
    /// an armed idle callback.
    pub(crate) fn is_alive(&self) -> bool {
        !self.timers.is_empty()
            || !self.idle.is_empty()
            || self.io.iter().any(|(_, entry)| !entry.interest.is_empty())
    }

    /// Returns the deadline of the earliest live timer.
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.heap.peek() {
            if self.is_live(entry) {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }

        None
    }

    fn is_live(&self, entry: &TimerEntry) -> bool {
        self.timers
            .get(entry.key)
            .is_some_and(|slot| slot.seq == entry.seq)
    }

    /// Waits for readiness and returns the sources to notify.
    ///
    /// Events for sources that were dropped without deregistering clean
    /// up their stale registration.
    pub(crate) fn poll(
        &mut self,
        timeout: Option<Duration>,
    ) -> io::Result<Vec<(Rc<dyn IoSource>, Event)>> {
        self.poller.poll(&mut self.events, timeout)?;

        let mut ready = Vec::with_capacity(self.events.len());
        let mut stale = Vec::new();

        for event in &self.events {
            let Some(entry) = self.io.get(event.token) else {
                continue;
            };

            match entry.source.upgrade() {
                Some(source) => ready.push((source, *event)),
                None => stale.push(event.token),
            }
        }

        for token in stale {
            self.deregister(token);
        }

        Ok(ready)
    }

    /// Removes every timer due at `now` and returns their callbacks in
    /// firing order.
    pub(crate) fn expired(&mut self, now: Instant) -> Vec<Callback> {
        let mut due = Vec::new();

        while let Some(entry) = self.heap.peek() {
            if entry.deadline > now {
                break;
            }

            let Some(entry) = self.heap.pop() else {
                break;
            };

            if !self.is_live(&entry) {
                continue;
            }

            if let Some(slot) = self.timers.remove(entry.key) {
                due.push(slot.callback);
            }
        }

        due
    }

    /// Snapshot of the armed idle callbacks.
    pub(crate) fn idle_callbacks(&self) -> Vec<Callback> {
        self.idle.iter().map(|(_, callback)| callback.clone()).collect()
    }
}
