/// An I/O event reported by the poller.
///
/// An `Event` represents readiness information for a registered file
/// descriptor. It is produced by the poller and consumed by the reactor,
/// which forwards it to the source registered under `token`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Event {
    /// Token associated with the registered file descriptor.
    pub(crate) token: usize,

    /// The file descriptor has data (or an EOF) to read.
    pub(crate) readable: bool,

    /// The file descriptor accepts writes.
    pub(crate) writable: bool,

    /// The peer hung up or the socket reported an error.
    ///
    /// Reported even when no interest is registered, so sources that are
    /// not reading still learn about dead peers.
    pub(crate) hangup: bool,
}
