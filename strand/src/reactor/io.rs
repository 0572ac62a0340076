use super::event::Event;
use super::poller::Interest;

use std::os::fd::RawFd;
use std::rc::Weak;

/// A descriptor-backed object driven by the reactor.
///
/// Connections and listeners implement `IoSource`. The reactor only keeps
/// a weak reference to each source, so dropping the last strong handle of
/// a connection is enough to tear it down; events that arrive for a
/// source that no longer exists are discarded.
pub(crate) trait IoSource {
    /// Handles one readiness event.
    ///
    /// Called on the loop thread with no reactor borrow held, so the
    /// source is free to change its interest, deregister itself, resume
    /// tasks or spawn new ones.
    fn ready(&self, event: Event);
}

/// An I/O registration held by the reactor.
pub(crate) struct IoEntry {
    /// The registered descriptor.
    pub(crate) fd: RawFd,

    /// Readiness currently requested from the poller.
    pub(crate) interest: Interest,

    /// The object notified on readiness.
    pub(crate) source: Weak<dyn IoSource>,
}
