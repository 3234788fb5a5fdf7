//! Internal data structures.
//!
//! This module provides low-level utilities used by the reactor.
//! In particular, it exposes a generational [`Slab`] used to store watch
//! registrations under stable, non-reusable keys.

mod slab;

pub(crate) use slab::{Key, Slab};
