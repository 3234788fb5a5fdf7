//! Error types.

use crate::connection::Status;

use std::io;
use thiserror::Error;

/// Errors reported synchronously by [`Connection`](crate::Connection) calls.
///
/// Failures of an asynchronous connect attempt are additionally reported
/// through [`Events`](crate::Events) delivered to the handler.
#[derive(Debug, Error)]
pub enum Error {
    /// The socket for a connect attempt could not be created.
    #[error("socket creation failed: {0}")]
    SocketCreate(#[source] io::Error),

    /// The connect attempt failed immediately or asynchronously.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The connect attempt did not resolve within its budget.
    #[error("connect timed out")]
    Timeout,

    /// A send, receive or socket query failed for a reason other than
    /// would-block or interruption.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The operation needs an open socket.
    #[error("connection is not connected")]
    NotConnected,

    /// The operation is not valid in the current lifecycle state.
    #[error("invalid connection state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        /// State the operation requires.
        expected: Status,
        /// State the connection was in.
        actual: Status,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
