//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the server.
//! In particular, it exposes a generation-checked [`Slab`] used both as the
//! timer wheel node arena and as the per-worker connection registry.

mod slab;

pub(crate) use slab::{Key, Slab};
