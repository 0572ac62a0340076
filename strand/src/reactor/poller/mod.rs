//! Platform-specific I/O poller abstraction.
//!
//! The poller is used by the reactor to:
//! - wait for I/O readiness events,
//! - wake the loop when worker threads hand back results,
//! - bound the wait by the next timer deadline.
//!
//! Only the Linux `epoll` backend exists.

pub(crate) mod common;

pub(crate) use common::{Interest, Waker};

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
