//! Resolved connect targets.
//!
//! Name resolution happens outside this crate. An [`Endpoint`] is what a
//! resolver hands back: an address plus the socket kind to open for it,
//! the equivalent of one `addrinfo` entry.

use std::fmt;
use std::net::SocketAddr;

/// Socket type used to reach an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// Connection-oriented byte stream (TCP).
    Stream,
    /// Connectionless datagrams (UDP).
    Datagram,
}

impl SocketKind {
    pub(crate) fn raw(self) -> libc::c_int {
        match self {
            SocketKind::Stream => libc::SOCK_STREAM,
            SocketKind::Datagram => libc::SOCK_DGRAM,
        }
    }
}

/// A resolved local or remote address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: SocketAddr,
    kind: SocketKind,
}

impl Endpoint {
    pub fn new(addr: SocketAddr, kind: SocketKind) -> Self {
        Self { addr, kind }
    }

    /// A stream endpoint.
    pub fn tcp(addr: SocketAddr) -> Self {
        Self::new(addr, SocketKind::Stream)
    }

    /// A datagram endpoint.
    pub fn udp(addr: SocketAddr) -> Self {
        Self::new(addr, SocketKind::Datagram)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.kind {
            SocketKind::Stream => "tcp",
            SocketKind::Datagram => "udp",
        };

        write!(f, "{scheme}://{}", self.addr)
    }
}
