//! Platform socket primitives.
//!
//! Everything the connection needs from the operating system goes through
//! this module: creating non-blocking sockets, binding, connecting, sending,
//! receiving, querying the pending error and both endpoints, and closing.
//!
//! Only Unix targets are supported; the reactor itself is epoll based and
//! therefore Linux only.

mod socket;
mod unix;

pub(crate) use socket::Socket;
