//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the loop.
//! In particular, it exposes a [`Slab`] used for fast indexed storage of
//! poller tokens, timers, idle registrations and tasks.

mod slab;

pub(crate) use slab::Slab;
