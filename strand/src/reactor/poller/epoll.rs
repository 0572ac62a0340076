//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register file descriptors with read/write interests
//! - Block waiting for I/O readiness
//! - Wake the loop when another thread hands it work (offload completions)
//! - Support timer-driven wakeups via poll timeouts
//!
//! Descriptors are registered level-triggered: a socket that still has
//! unread data, or a write queue that is still non-empty, keeps being
//! reported until the source drops the matching interest.

use super::common::Interest;
use crate::reactor::event::Event;
use crate::reactor::poller::Waker;

use libc::{
    EFD_CLOEXEC, EFD_NONBLOCK, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD,
    EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
    eventfd,
};
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Reserved token used internally for the wake-up event.
///
/// Using `u64::MAX` guarantees it never collides with a slab index.
const WAKE_TOKEN: u64 = u64::MAX;

/// Linux `epoll` poller.
///
/// This poller owns:
/// - an `epoll` instance,
/// - an internal `eventfd` used as a wake-up signal,
/// - a reusable event buffer.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    /// Waker wrapping the internal eventfd.
    waker: Arc<Waker>,
}

impl Waker {
    /// Wake the poller.
    ///
    /// This writes to the internal `eventfd`, causing `epoll_wait`
    /// to return immediately.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 8);
        }
    }

    /// Resets the eventfd counter after a wake-up was observed.
    fn reset(&self) {
        let mut buf = 0u64;
        unsafe {
            libc::read(self.0, &mut buf as *mut _ as *mut _, 8);
        }
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe { libc::close(self.0) };
    }
}

fn interest_flags(interest: Interest) -> u32 {
    let mut flags = 0;

    if interest.read {
        flags |= EPOLLIN;
    }
    if interest.write {
        flags |= EPOLLOUT;
    }

    flags as u32
}

impl EpollPoller {
    /// Create a new `EpollPoller` able to report `capacity` events per poll.
    ///
    /// This creates the epoll instance and a non-blocking `eventfd`
    /// registered as a persistent wake source.
    pub(crate) fn new(capacity: usize) -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let wake_fd = unsafe { eventfd(0, EFD_NONBLOCK | EFD_CLOEXEC) };
        if wake_fd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(err);
        }

        let waker = Arc::new(Waker(wake_fd));

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        let rc = unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, wake_fd, &mut event) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(err);
        }

        Ok(Self {
            epoll,
            events: Vec::with_capacity(capacity.max(1)),
            waker,
        })
    }

    /// Return the poller waker.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    /// Register a file descriptor with the poller.
    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_ADD, fd, token, interest)
    }

    /// Update interest flags for an already registered descriptor.
    pub(crate) fn reregister(&self, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        self.ctl(EPOLL_CTL_MOD, fd, token, interest)
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    fn ctl(&self, op: i32, fd: RawFd, token: usize, interest: Interest) -> io::Result<()> {
        let mut event = epoll_event {
            events: interest_flags(interest),
            u64: token as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Poll for I/O readiness events.
    ///
    /// Blocks until at least one descriptor becomes ready, the wake event
    /// is triggered, or the optional timeout expires. Ready events are
    /// appended to `events` (which is cleared first).
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        // Round up so a 0.4ms deadline does not turn into a busy spin.
        let timeout_ms = timeout
            .map(|t| {
                let ms = t.as_millis() + u128::from(t.subsec_nanos() % 1_000_000 != 0);
                ms.min(i32::MAX as u128) as i32
            })
            .unwrap_or(-1);

        events.clear();

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            if ev.u64 == WAKE_TOKEN {
                self.waker.reset();
                continue;
            }

            let flags = ev.events;
            let token = ev.u64 as usize;

            let hangup = flags & ((EPOLLERR | EPOLLHUP) as u32) != 0;
            let readable = flags & (EPOLLIN as u32) != 0;
            let writable = flags & (EPOLLOUT as u32) != 0;

            events.push(Event {
                token,
                readable,
                writable,
                hangup,
            });
        }

        unsafe {
            self.events.set_len(0);
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe { libc::close(self.epoll) };
    }
}
