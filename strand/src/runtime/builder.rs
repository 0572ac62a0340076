use super::EventLoop;
use crate::error::Result;

use std::thread;

/// Settings of one event loop, fixed when it is built.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    /// Threads of the offload pool, started on first use.
    pub(crate) offload_threads: usize,

    /// Size of each `recv` issued when a connection is readable.
    pub(crate) read_chunk_size: usize,

    /// Initial capacity of a connection's read buffer.
    pub(crate) initial_buffer_capacity: usize,

    /// Backlog passed to `listen`.
    pub(crate) listen_backlog: i32,

    /// Maximum number of readiness events collected per poll.
    pub(crate) event_capacity: usize,
}

/// Builder for configuring and creating an [`EventLoop`].
///
/// # Examples
///
/// ```rust,ignore
/// let event_loop = LoopBuilder::new()
///     .offload_threads(2)
///     .read_chunk_size(16 * 1024)
///     .build()?;
/// ```
pub struct LoopBuilder {
    config: Config,
}

impl LoopBuilder {
    /// Creates a builder with default settings.
    ///
    /// By default the offload pool has one thread per logical CPU
    /// (falling back to `1`), connections read in chunks of 4 KiB into
    /// buffers starting at 1 KiB, and listeners use a backlog of 128.
    pub fn new() -> Self {
        let offload_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            config: Config {
                offload_threads,
                read_chunk_size: 4096,
                initial_buffer_capacity: 1024,
                listen_backlog: 128,
                event_capacity: 64,
            },
        }
    }

    /// Sets the number of offload threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn offload_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "offload_threads must be > 0");

        self.config.offload_threads = n;
        self
    }

    /// Sets how many bytes are received per `recv` call.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn read_chunk_size(mut self, n: usize) -> Self {
        assert!(n > 0, "read_chunk_size must be > 0");

        self.config.read_chunk_size = n;
        self
    }

    /// Sets the initial capacity of connection read buffers.
    pub fn initial_buffer_capacity(mut self, n: usize) -> Self {
        self.config.initial_buffer_capacity = n;
        self
    }

    /// Sets the backlog of listening sockets.
    pub fn listen_backlog(mut self, n: i32) -> Self {
        self.config.listen_backlog = n;
        self
    }

    /// Sets how many readiness events a single poll can report.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn event_capacity(mut self, n: usize) -> Self {
        assert!(n > 0, "event_capacity must be > 0");

        self.config.event_capacity = n;
        self
    }

    /// Builds the loop on the current thread.
    ///
    /// The loop is bound to this thread: its handles and everything
    /// registered with it are `!Send`.
    pub fn build(self) -> Result<EventLoop> {
        EventLoop::with_config(self.config)
    }
}

impl Default for LoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
