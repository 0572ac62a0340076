//! Reactor core and event handling.
//!
//! The reactor owns the `epoll` poller, the I/O registrations, the timer
//! heap and the idle callbacks of one event loop. It is responsible for:
//! - waiting for I/O readiness,
//! - ordering and expiring one-shot timers,
//! - tracking idle callbacks run when the loop has nothing else to do.
//!
//! The reactor lives inside the loop and is only touched from the loop
//! thread. Higher-level primitives (connections, listeners, timers, idle
//! workers) register with it through the loop handle.

mod core;
mod timer;

pub(crate) mod event;
pub(crate) mod io;
pub(crate) mod poller;

pub(crate) use self::core::Reactor;
pub(crate) use event::Event;
pub(crate) use io::IoSource;
pub(crate) use poller::Interest;
