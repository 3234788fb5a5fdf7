use super::{Connection, Status};
use crate::buffer::BufferQueue;
use crate::error::{Error, Result};
use crate::protocol::Protocol;
use crate::sys::Socket;

use std::io;
use tracing::{trace, warn};

impl Connection {
    /// Writes `data` according to the transport.
    ///
    /// - `Udp`: a single send of the whole payload as one datagram. Returns
    ///   what the socket accepted; nothing is buffered between calls.
    /// - `Tcp`: sends as much as the socket accepts right away and queues
    ///   the rest, which is flushed as the socket becomes writable. Returns
    ///   the full payload length. `on_sendable` fires once the queue has
    ///   drained; a send failure during the flush ends the connection with
    ///   an `ERROR` event. If the socket fails after taking part of the
    ///   payload, that count is returned, the rest is dropped and the next
    ///   call reports the error; a failure before any byte left is `Err`.
    /// - `Tls`: appends `data` to the outbound queue for the record layer
    ///   (see [`take_outbound`](Self::take_outbound)) without touching the
    ///   socket, and returns its length.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let shared = &self.shared;
        let mut state = shared.state.borrow_mut();
        let state = &mut *state;

        if state.protocol == Protocol::Tls {
            if state.status == Status::Closed {
                return Err(Error::NotConnected);
            }

            state.tx_queue.append(data);
            trace!(bytes = data.len(), queued = state.tx_queue.len(), "queued for record layer");
            return Ok(data.len());
        }

        if state.status != Status::Connected {
            return Err(Error::NotConnected);
        }

        let socket = state.socket.as_ref().ok_or(Error::NotConnected)?;

        if state.protocol == Protocol::Udp {
            let sent = send_once(socket, data)?;
            trace!(bytes = sent, "datagram sent");
            return Ok(sent);
        }

        // Earlier bytes still queued must leave first.
        let mut sent = 0;
        if state.tx_queue.is_empty() {
            let (n, failure) = send_available(socket, data);
            sent = n;

            if let Some(e) = failure {
                if sent == 0 {
                    return Err(Error::Io(e));
                }

                // Part of the payload is already on the wire: report that,
                // the next call sees the error.
                warn!(fd = socket.fd(), sent, error = %e, "stream write cut short");
                return Ok(sent);
            }
        }

        if sent < data.len() {
            state.tx_queue.append(&data[sent..]);

            if let Some(watch) = state.watch {
                shared.reactor.set_interest(watch, state.wanted_interest())?;
            }
        }

        trace!(sent, queued = state.tx_queue.len(), "stream write");
        Ok(data.len())
    }

    /// Number of received bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.shared.state.borrow().rx_queue.len()
    }

    /// Returns up to `max_len` received bytes without consuming them.
    pub fn peek(&self, max_len: usize) -> Vec<u8> {
        self.shared.state.borrow().rx_queue.copy(max_len)
    }

    /// Consumes and returns up to `max_len` received bytes.
    pub fn read(&self, max_len: usize) -> Vec<u8> {
        self.shared.state.borrow_mut().rx_queue.remove(max_len)
    }

    /// Number of bytes in the outbound queue.
    ///
    /// In `Tls` mode this is the plaintext waiting for the record layer;
    /// for `Tcp` it is the part of earlier writes the socket has not taken
    /// yet.
    pub fn outbound_len(&self) -> usize {
        self.shared.state.borrow().tx_queue.len()
    }

    /// Removes up to `max_len` bytes of queued `Tls` plaintext.
    ///
    /// This is the hand-off point to an external record layer: it encrypts
    /// what it takes and is responsible for putting the records on the wire.
    /// Returns nothing for other transports, whose queue belongs to the
    /// connection.
    pub fn take_outbound(&self, max_len: usize) -> Vec<u8> {
        let mut state = self.shared.state.borrow_mut();

        if state.protocol != Protocol::Tls {
            return Vec::new();
        }

        state.tx_queue.remove(max_len)
    }
}

/// One send attempt, retried only if interrupted.
fn send_once(socket: &Socket, data: &[u8]) -> Result<usize> {
    loop {
        match socket.send(data) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
}

/// Sends until the socket would block or `data` is exhausted.
///
/// Returns the bytes sent along with the hard error that stopped the loop,
/// if any.
fn send_available(socket: &Socket, data: &[u8]) -> (usize, Option<io::Error>) {
    let mut sent = 0;

    while sent < data.len() {
        match socket.send(&data[sent..]) {
            Ok(0) => break,
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return (sent, Some(e)),
        }
    }

    (sent, None)
}

/// Moves bytes from `queue` to the socket until it would block.
///
/// Returns `true` once the queue is empty.
pub(super) fn drain(socket: &Socket, queue: &mut BufferQueue) -> io::Result<bool> {
    while !queue.is_empty() {
        match socket.send(queue.front_slice()) {
            Ok(0) => return Ok(false),
            Ok(n) => {
                queue.consume(n);
                trace!(bytes = n, left = queue.len(), "flushed");
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(e),
        }
    }

    Ok(true)
}
