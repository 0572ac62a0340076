//! Timers, idle callbacks and sleeps.
//!
//! - [`sleep`] suspends the calling task for a duration,
//! - [`Timer`] binds a task to a one-shot or periodic timer,
//! - [`Idle`] binds a task to the loop's idle passes,
//! - [`IdleWorker`] runs a chain of continuations one per idle pass.
//!
//! Timer and idle tasks receive a [`Ticker`] to wait for their next tick.

mod idle;
mod registration;
mod sleep;
mod timer;
mod worker;

pub use idle::Idle;
pub use registration::Ticker;
pub use sleep::{Sleep, sleep};
pub use timer::Timer;
pub use worker::IdleWorker;
