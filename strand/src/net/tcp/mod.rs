//! TCP networking implementation.
//!
//! It is split into:
//! - [`listener`]: binding, accepting and dispatching connections to an
//!   entry task,
//! - [`connection`]: buffered reads, delimiter reads and queued sends on
//!   an established connection.

pub mod connection;
pub mod listener;

pub use connection::TcpConnection;
pub use listener::TcpListener;
