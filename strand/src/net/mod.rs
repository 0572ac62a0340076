//! Non-blocking TCP networking.
//!
//! [`TcpListener`] accepts connections and hands each one to a fresh
//! task; [`TcpConnection`] offers buffered exact and delimiter reads plus
//! a FIFO write queue. [`resolve`] looks up host names off the loop
//! thread.

pub(crate) mod buffer;
pub(crate) mod queue;

mod resolve;

pub mod tcp;

pub use resolve::resolve;
pub use tcp::{TcpConnection, TcpListener};
