//! Reactor core and event handling.
//!
//! This module implements the single-threaded event loop connections are
//! bound to. The reactor is responsible for:
//! - driving I/O readiness for registered descriptors,
//! - managing one-shot timers,
//! - invoking the callbacks attached to both.
//!
//! Everything runs on the thread that drives the loop; nothing here is
//! `Send` or `Sync`.

mod core;
mod event;
mod poller;
mod timer;

pub use self::core::{Reactor, TimerId, WatchId};
pub use event::Readiness;
pub use poller::Interest;
