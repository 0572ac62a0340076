//! Error type shared by every engine operation.

use std::io;
use std::net::SocketAddr;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures reported by the event loop and its primitives.
///
/// Errors local to a single operation are returned (or resumed) to that
/// operation's caller only. Socket-level failures additionally terminate
/// the connection, after every outstanding waiter has received one.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The stream is not reading, or has already been closed.
    #[error("connection is not active")]
    NotActive,

    /// The peer went away or the socket failed while an operation was pending.
    #[error("connection disconnected")]
    Disconnected,

    /// `read_until` was called with a zero-length delimiter.
    #[error("delimiter must not be empty")]
    EmptyDelimiter,

    /// A second read was issued before the first one resolved.
    #[error("a read is already pending on this connection")]
    ReadInProgress,

    /// Creating, binding or listening on a server socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// An outbound connection could not be established.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Host name resolution failed.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// A closure handed to the worker pool panicked or was never run.
    #[error("offloaded task failed: {0}")]
    Offload(String),

    /// The registration a task was parked on has been closed.
    #[error("registration closed")]
    Closed,

    /// The event loop behind a handle no longer exists.
    #[error("event loop has been dropped")]
    LoopClosed,

    /// A spawned task panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Any other operating system error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
