use super::unix::{
    domain_of, sys_bind, sys_close, sys_connect, sys_peername, sys_recv, sys_send,
    sys_set_nonblocking, sys_sockname, sys_socket, sys_take_error,
};
use crate::endpoint::SocketKind;

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

/// Outcome of a non-blocking connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectProgress {
    /// The connection was established synchronously (loopback, datagram).
    Done,
    /// The handshake is running; completion is signalled by writability.
    InProgress,
}

/// An exclusively owned, non-blocking socket.
///
/// The descriptor is closed exactly once, when the `Socket` is dropped.
#[derive(Debug)]
pub(crate) struct Socket {
    fd: RawFd,
    kind: SocketKind,
}

impl Socket {
    /// Creates a non-blocking socket able to reach `addr`.
    pub(crate) fn open(addr: &SocketAddr, kind: SocketKind) -> io::Result<Self> {
        let fd = sys_socket(domain_of(addr), kind.raw())?;

        Ok(Self { fd, kind })
    }

    /// Takes ownership of an already connected stream descriptor.
    pub(crate) fn adopt(fd: OwnedFd) -> io::Result<Self> {
        sys_set_nonblocking(fd.as_raw_fd())?;

        Ok(Self {
            fd: fd.into_raw_fd(),
            kind: SocketKind::Stream,
        })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd
    }

    pub(crate) fn kind(&self) -> SocketKind {
        self.kind
    }

    pub(crate) fn bind(&self, addr: &SocketAddr) -> io::Result<()> {
        sys_bind(self.fd, addr)
    }

    /// Starts connecting to `addr` without blocking.
    pub(crate) fn connect(&self, addr: &SocketAddr) -> io::Result<ConnectProgress> {
        match sys_connect(self.fd, addr) {
            Ok(()) => Ok(ConnectProgress::Done),
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
                Ok(ConnectProgress::InProgress)
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn send(&self, buffer: &[u8]) -> io::Result<usize> {
        sys_send(self.fd, buffer)
    }

    pub(crate) fn recv(&self, buffer: &mut [u8]) -> io::Result<usize> {
        sys_recv(self.fd, buffer)
    }

    /// Returns the error left behind by an asynchronous connect, if any.
    pub(crate) fn take_error(&self) -> io::Result<Option<io::Error>> {
        sys_take_error(self.fd)
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        sys_sockname(self.fd)
    }

    pub(crate) fn peer_addr(&self) -> io::Result<SocketAddr> {
        sys_peername(self.fd)
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}
