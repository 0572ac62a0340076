//! # Strand
//!
//! **Strand** is a single-threaded event loop running sequential-looking
//! tasks over non-blocking sockets, timers and idle ticks.
//!
//! A task is an ordinary `async` block owned by one [`EventLoop`]. It
//! suspends only at engine operations (a read, a waiting send, a timer
//! tick, an idle-worker split, an offloaded closure) and is resumed
//! exactly once with the result. Everything runs on the loop thread;
//! blocking work can be shipped to a small worker pool with
//! [`Handle::spawn_blocking`].
//!
//! It provides:
//!
//! - **TCP** listeners handing each accepted connection to a fresh task,
//!   and connections with exact-length reads, delimiter reads and a FIFO
//!   write queue ([`net`])
//! - **Timers** and **idle** registrations driving a bound task, plus an
//!   idle-time continuation chain and `sleep` ([`time`])
//! - **Worker offload** for blocking closures
//! - **Macros** `#[strand::main]` and `#[strand::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strand::net::{TcpConnection, TcpListener};
//! use strand::{EventLoop, Result};
//!
//! async fn echo(conn: TcpConnection) -> Result<()> {
//!     conn.start_read()?;
//!
//!     loop {
//!         let line = conn.read_until(b"\n", None).await?;
//!         conn.send(line).await?;
//!     }
//! }
//!
//! fn main() -> Result<()> {
//!     let event_loop = EventLoop::new()?;
//!
//!     let listener = TcpListener::bind(&event_loop.handle(), "127.0.0.1:7000", echo)?;
//!     listener.start()?;
//!
//!     event_loop.run()
//! }
//! ```
//!
//! ## Modules
//!
//! - [`net`]: TCP listener, connection and name resolution
//! - [`time`]: sleep, timers, idle registrations and the idle worker
//! - [`task`]: spawning and joining tasks

mod error;
mod reactor;
mod runtime;
mod utils;

pub mod net;
pub mod time;

pub use error::{Error, Result};
pub use runtime::task;
pub use runtime::task::{JoinHandle, TaskState, spawn};
pub use runtime::yield_now::yield_now;
pub use runtime::{EventLoop, Handle, LoopBuilder, Suspend, default_loop, run_default_loop};

pub use strand_macros::{main, test};
