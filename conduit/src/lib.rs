//! # Conduit
//!
//! **Conduit** is a buffered client connection for single-threaded,
//! readiness-based programs. One [`Connection`] hides the differences between
//! datagram (`udp`), stream (`tcp`) and encrypted-stream (`tls`) transports
//! behind the same connect / read / write / event API.
//!
//! It offers:
//!
//! - A **single-threaded epoll [`Reactor`]** with descriptor watches and
//!   one-shot timers
//! - **Non-blocking connects** raced against a timeout, or **adoption** of a
//!   socket that is already connected
//! - **Buffered reads**: received bytes are queued and announced chunk by
//!   chunk through a [`Handler`]
//! - **Per-transport writes**: datagrams go out as-is, stream bytes the
//!   socket cannot take yet are queued and flushed on writability, and `tls`
//!   plaintext is queued for an external record layer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::{Callbacks, Connection, Endpoint, Events, Reactor};
//! use std::time::Duration;
//!
//! let reactor = Reactor::new()?;
//! let conn = Connection::new(&reactor);
//!
//! conn.set_handler(
//!     Callbacks::new()
//!         .on_data(|conn| {
//!             let bytes = conn.read(conn.available());
//!             println!("received {} bytes", bytes.len());
//!         })
//!         .on_event(|conn, events| {
//!             if events.contains(Events::CONNECTED) {
//!                 conn.write(b"hello").ok();
//!             } else {
//!                 conn.reactor().stop();
//!             }
//!         }),
//! );
//!
//! conn.connect(None, &Endpoint::tcp("127.0.0.1:4444".parse()?), Duration::from_secs(5))?;
//! reactor.run()?;
//! ```
//!
//! ## Modules
//!
//! - [`reactor`] — The event loop, watches and timers
//! - [`buffer`] — The FIFO byte queue behind both connection queues

mod config;
mod connection;
mod endpoint;
mod error;
mod protocol;
mod sys;
mod utils;

pub mod buffer;
pub mod reactor;

pub use config::{ConnectionBuilder, ConnectionConfig, DEFAULT_READ_CHUNK_SIZE};
pub use connection::{Callbacks, Connection, Events, Handler, Status};
pub use endpoint::{Endpoint, SocketKind};
pub use error::{Error, Result};
pub use protocol::Protocol;
pub use reactor::Reactor;
