//! The event loop and its task machinery.
//!
//! This module contains:
//! - [`EventLoop`] and its cloneable [`Handle`],
//! - [`LoopBuilder`] for configuring a loop,
//! - the task container, waker and [`JoinHandle`](task::JoinHandle),
//! - the [`Suspend`] future returned by every suspension point,
//! - the offload pool behind [`Handle::spawn_blocking`],
//! - the per-thread current and default loop.

mod core;
mod offload;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod suspend;
pub(crate) mod yield_now;

pub mod task;

pub use self::core::{EventLoop, Handle};
pub use builder::LoopBuilder;
pub use context::{default_loop, run_default_loop};
pub use suspend::Suspend;
