use std::os::fd::RawFd;

/// Readiness a source wants to be notified about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,
}

impl Interest {
    pub(crate) const NONE: Interest = Interest {
        read: false,
        write: false,
    };

    pub(crate) const WRITE: Interest = Interest {
        read: false,
        write: true,
    };

    /// Returns a copy with the read flag set to `read`.
    pub(crate) fn with_read(self, read: bool) -> Self {
        Self { read, ..self }
    }

    /// Returns a copy with the write flag set to `write`.
    pub(crate) fn with_write(self, write: bool) -> Self {
        Self { write, ..self }
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.read && !self.write
    }
}

/// Cross-thread wake-up handle for a blocked poller.
///
/// Wraps the poller's `eventfd`; writing to it makes `epoll_wait` return.
pub(crate) struct Waker(pub(crate) RawFd);

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}
