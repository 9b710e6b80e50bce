//! Utilities for memory-efficient data structures.
//!
//! This module provides low-level utilities used internally by the crate.
//! In particular, it exposes a generational [`Slab`] used for every
//! registration table: stable keys, fast reuse of freed slots, and stale
//! keys that never resolve to a newer value.

mod slab;

pub(crate) use slab::{Key, Slab};
