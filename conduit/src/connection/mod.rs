//! Buffered client connections.
//!
//! A [`Connection`] owns one socket, a connect timer and two byte queues,
//! and turns reactor readiness into owner-facing [`Events`]:
//!
//! ```text
//!            connect()                writable, no error
//!   New ─────────────────▶ Connecting ─────────────────▶ Connected
//!    │                         │                             │
//!    │ adopt()                 │ error / timeout             │ eof / error
//!    └────────▶ Connected      ▼                             ▼
//!                            Closed ◀────────────────────── Closed
//! ```
//!
//! `close()` moves any state to `Closed`. `Closed` is terminal: a new
//! connection has to be built to try again.

mod events;
mod handler;
mod io;

pub use events::Events;
pub use handler::{Callbacks, Handler};

use crate::buffer::BufferQueue;
use crate::config::{ConnectionBuilder, ConnectionConfig};
use crate::endpoint::{Endpoint, SocketKind};
use crate::error::{Error, Result};
use crate::protocol::Protocol;
use crate::reactor::{Interest, Reactor, Readiness, TimerId, WatchId};
use crate::sys::Socket;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::os::fd::OwnedFd;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Built, no socket attached yet.
    New,
    /// Non-blocking connect in flight, timer armed.
    Connecting,
    /// Socket connected and watched for reads.
    Connected,
    /// Terminal; the socket has been released.
    Closed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::New => "new",
            Status::Connecting => "connecting",
            Status::Connected => "connected",
            Status::Closed => "closed",
        };

        f.write_str(name)
    }
}

/// A buffered connection bound to a [`Reactor`].
///
/// `Connection` is a handle; clones refer to the same connection. The
/// socket, timer and watch are released by [`close`](Self::close), by a
/// terminal event, or when the last handle is dropped, whichever comes
/// first.
#[derive(Clone)]
pub struct Connection {
    shared: Rc<Shared>,
}

pub(crate) struct Shared {
    reactor: Reactor,
    config: ConnectionConfig,
    state: RefCell<State>,
    handler: RefCell<Option<Box<dyn Handler>>>,
    /// Bumped on every handler replacement so a callback in progress can
    /// tell whether it was replaced while running.
    handler_epoch: Cell<u64>,
    /// Set while a callback runs; notices raised meanwhile wait in
    /// `deferred`.
    dispatching: Cell<bool>,
    deferred: RefCell<VecDeque<Notice>>,
    /// Receive scratch buffer, `config.read_chunk_size` bytes.
    scratch: RefCell<Vec<u8>>,
}

struct State {
    status: Status,
    protocol: Protocol,
    socket: Option<Socket>,
    watch: Option<WatchId>,
    connect_timer: Option<TimerId>,
    rx_queue: BufferQueue,
    tx_queue: BufferQueue,
    last_error: Option<Error>,
}

impl State {
    /// Releases the watch, the timer and the socket, in that order.
    ///
    /// Safe to call any number of times.
    fn release(&mut self, reactor: &Reactor) {
        if let Some(watch) = self.watch.take() {
            reactor.unregister(watch);
        }

        if let Some(timer) = self.connect_timer.take() {
            reactor.disarm_timer(timer);
        }

        self.socket = None;
    }

    /// The readiness a connected socket should be watched for.
    fn wanted_interest(&self) -> Interest {
        if self.protocol == Protocol::Tcp && !self.tx_queue.is_empty() {
            Interest::BOTH
        } else {
            Interest::READABLE
        }
    }

    fn fd(&self) -> i32 {
        self.socket.as_ref().map(Socket::fd).unwrap_or(-1)
    }
}

impl Connection {
    /// Creates a connection with the default configuration.
    pub fn new(reactor: &Reactor) -> Self {
        ConnectionBuilder::new(reactor).build()
    }

    /// Starts configuring a connection.
    pub fn builder(reactor: &Reactor) -> ConnectionBuilder {
        ConnectionBuilder::new(reactor)
    }

    pub(crate) fn with_config(reactor: &Reactor, config: ConnectionConfig) -> Self {
        let state = State {
            status: Status::New,
            protocol: config.protocol,
            socket: None,
            watch: None,
            connect_timer: None,
            rx_queue: BufferQueue::new(),
            tx_queue: BufferQueue::new(),
            last_error: None,
        };

        let shared = Shared {
            reactor: reactor.clone(),
            scratch: RefCell::new(vec![0; config.read_chunk_size]),
            config,
            state: RefCell::new(state),
            handler: RefCell::new(None),
            handler_epoch: Cell::new(0),
            dispatching: Cell::new(false),
            deferred: RefCell::new(VecDeque::new()),
        };

        Self {
            shared: Rc::new(shared),
        }
    }

    /// Installs the owner's callbacks, replacing any previous handler.
    pub fn set_handler<H>(&self, handler: H)
    where
        H: Handler + 'static,
    {
        self.shared.replace_handler(Some(Box::new(handler)));
    }

    /// Removes the owner's callbacks.
    pub fn clear_handler(&self) {
        self.shared.replace_handler(None);
    }

    /// Starts an asynchronous connect to `remote`.
    ///
    /// The socket type follows `remote`: datagram endpoints give a `Udp`
    /// connection, stream endpoints a `Tcp` one (`Tls` if the connection was
    /// built with that hint). If `local` is given the socket is bound to it
    /// first; a failed bind is logged and otherwise ignored.
    ///
    /// On `Ok` the outcome arrives later as exactly one of
    /// [`Events::CONNECTED`], [`Events::ERROR`] or
    /// `Events::ERROR | Events::TIMEOUT`. If the socket cannot be created or
    /// the connect fails immediately, `Events::ERROR` is delivered before
    /// this returns the error (or right after the running callback, when
    /// called from one), and the connection stays `New`.
    pub fn connect(
        &self,
        local: Option<&Endpoint>,
        remote: &Endpoint,
        timeout: Duration,
    ) -> Result<()> {
        let shared = &self.shared;
        shared.expect_status(Status::New)?;

        let socket = match Socket::open(&remote.addr(), remote.kind()) {
            Ok(socket) => socket,
            Err(e) => {
                warn!(%remote, error = %e, "socket creation failed");
                shared.emit_event(Events::ERROR);
                return Err(Error::SocketCreate(e));
            }
        };

        let protocol = match (socket.kind(), shared.config.protocol) {
            (SocketKind::Datagram, _) => Protocol::Udp,
            (SocketKind::Stream, Protocol::Tls) => Protocol::Tls,
            (SocketKind::Stream, _) => Protocol::Tcp,
        };

        if let Some(local) = local {
            if let Err(e) = socket.bind(&local.addr()) {
                warn!(fd = socket.fd(), %local, error = %e, "bind failed, continuing unbound");
            }
        }

        let progress = match socket.connect(&remote.addr()) {
            Ok(progress) => progress,
            Err(e) => {
                warn!(fd = socket.fd(), %remote, error = %e, "connect failed");
                drop(socket);
                shared.emit_event(Events::ERROR);
                return Err(Error::Connect(e));
            }
        };

        let watch = match shared.watch(&socket, Interest::WRITABLE) {
            Ok(watch) => watch,
            Err(e) => {
                warn!(fd = socket.fd(), error = %e, "cannot watch socket");
                drop(socket);
                shared.emit_event(Events::ERROR);
                return Err(Error::Io(e));
            }
        };

        let weak = Rc::downgrade(shared);
        let timer = shared.reactor.arm_timer(timeout, move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_connect_timeout();
            }
        });

        debug!(
            fd = socket.fd(),
            %remote,
            %protocol,
            ?progress,
            ?timeout,
            "connecting"
        );

        let mut state = shared.state.borrow_mut();
        state.protocol = protocol;
        state.socket = Some(socket);
        state.watch = Some(watch);
        state.connect_timer = Some(timer);
        state.status = Status::Connecting;

        Ok(())
    }

    /// Takes over a socket that is already connected, e.g. one returned by
    /// `accept`.
    ///
    /// The socket is switched to non-blocking mode and watched for reads,
    /// the connection becomes `Connected` and [`Events::CONNECTED`] is
    /// delivered before this returns. No timer is armed.
    pub fn adopt(&self, fd: impl Into<OwnedFd>) -> Result<()> {
        let shared = &self.shared;
        shared.expect_status(Status::New)?;

        let socket = Socket::adopt(fd.into())?;
        let watch = shared.watch(&socket, Interest::READABLE)?;

        let protocol = match shared.config.protocol {
            Protocol::Tls => Protocol::Tls,
            _ => Protocol::Tcp,
        };

        debug!(fd = socket.fd(), %protocol, "adopted connected socket");

        {
            let mut state = shared.state.borrow_mut();
            state.protocol = protocol;
            state.socket = Some(socket);
            state.watch = Some(watch);
            state.status = Status::Connected;
        }

        shared.emit_event(Events::CONNECTED);
        Ok(())
    }

    /// Tears the connection down.
    ///
    /// Releases the watch, the timer, the socket and the storage of both
    /// queues. No event is delivered and the handler is dropped. Calling
    /// `close` again, or from inside a callback, is harmless.
    pub fn close(&self) {
        let shared = &self.shared;

        {
            let mut state = shared.state.borrow_mut();

            if state.status != Status::Closed {
                debug!(fd = state.fd(), status = %state.status, "closing");
            }

            state.release(&shared.reactor);
            state.status = Status::Closed;
            state.rx_queue.clear();
            state.tx_queue.clear();
        }

        shared.replace_handler(None);
    }

    pub fn status(&self) -> Status {
        self.shared.state.borrow().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == Status::Connected
    }

    /// The transport in use, or the configured hint before a socket is
    /// attached.
    pub fn protocol(&self) -> Protocol {
        self.shared.state.borrow().protocol
    }

    /// The reactor this connection is bound to.
    pub fn reactor(&self) -> &Reactor {
        &self.shared.reactor
    }

    /// Takes the error behind the last `ERROR` event, if any.
    pub fn take_error(&self) -> Option<Error> {
        self.shared.state.borrow_mut().last_error.take()
    }

    /// Local address of the socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let state = self.shared.state.borrow();
        let socket = state.socket.as_ref().ok_or(Error::NotConnected)?;

        Ok(socket.local_addr()?)
    }

    /// Remote address of the socket.
    pub fn peer_addr(&self) -> Result<SocketAddr> {
        let state = self.shared.state.borrow();
        let socket = state.socket.as_ref().ok_or(Error::NotConnected)?;

        Ok(socket.peer_addr()?)
    }

    /// Local address as a presentation string and port.
    pub fn local_endpoint(&self) -> Result<(String, u16)> {
        self.local_addr().map(split_addr)
    }

    /// Remote address as a presentation string and port.
    pub fn peer_endpoint(&self) -> Result<(String, u16)> {
        self.peer_addr().map(split_addr)
    }
}

fn split_addr(addr: SocketAddr) -> (String, u16) {
    (addr.ip().to_string(), addr.port())
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();

        f.debug_struct("Connection")
            .field("status", &state.status)
            .field("protocol", &state.protocol)
            .field("fd", &state.fd())
            .field("rx", &state.rx_queue.len())
            .field("tx", &state.tx_queue.len())
            .finish()
    }
}

/// A pending handler callback.
enum Notice {
    Data,
    Sendable,
    Event(Events),
}

/// How a read-readiness pass ended.
enum ReadEnd {
    /// The socket has nothing more for now.
    Drained,
    /// The peer closed the stream.
    Eof,
    /// `recv` failed hard.
    Failed(std::io::Error),
}

impl Shared {
    fn expect_status(&self, expected: Status) -> Result<()> {
        let actual = self.state.borrow().status;

        if actual != expected {
            return Err(Error::InvalidState { expected, actual });
        }

        Ok(())
    }

    /// Registers `socket` with the reactor, routing readiness back here.
    fn watch(self: &Rc<Self>, socket: &Socket, interest: Interest) -> std::io::Result<WatchId> {
        let weak: Weak<Shared> = Rc::downgrade(self);

        self.reactor.register(socket.fd(), interest, move |readiness| {
            if let Some(shared) = weak.upgrade() {
                shared.on_ready(readiness);
            }
        })
    }

    fn on_ready(self: &Rc<Self>, readiness: Readiness) {
        let status = self.state.borrow().status;

        match status {
            Status::Connecting => self.finish_connect(),
            Status::Connected => {
                if readiness.readable {
                    self.on_readable();
                }

                if readiness.writable && self.state.borrow().status == Status::Connected {
                    self.flush();
                }
            }
            Status::New | Status::Closed => {}
        }
    }

    /// Resolves a pending connect once the socket turns writable.
    fn finish_connect(self: &Rc<Self>) {
        let outcome = {
            let mut state = self.state.borrow_mut();

            if let Some(timer) = state.connect_timer.take() {
                self.reactor.disarm_timer(timer);
            }

            match state.socket.as_ref().map(Socket::take_error) {
                Some(Ok(None)) => Ok(()),
                Some(Ok(Some(e))) | Some(Err(e)) => Err(e),
                None => return,
            }
        };

        match outcome {
            Ok(()) => {
                let switched = {
                    let mut state = self.state.borrow_mut();
                    state.status = Status::Connected;

                    match state.watch {
                        Some(watch) => self.reactor.set_interest(watch, Interest::READABLE),
                        None => Ok(()),
                    }
                };

                if let Err(e) = switched {
                    warn!(error = %e, "cannot watch connected socket");
                    self.fail(Error::Io(e), Events::ERROR);
                    return;
                }

                debug!(fd = self.state.borrow().fd(), "connected");
                self.emit_event(Events::CONNECTED);
            }
            Err(e) => {
                warn!(fd = self.state.borrow().fd(), error = %e, "connect failed");
                self.fail(Error::Connect(e), Events::ERROR);
            }
        }
    }

    fn on_connect_timeout(self: &Rc<Self>) {
        {
            let mut state = self.state.borrow_mut();

            if state.status != Status::Connecting {
                return;
            }

            state.connect_timer = None;
            warn!(fd = state.fd(), "connect timed out");
        }

        self.fail(Error::Timeout, Events::ERROR | Events::TIMEOUT);
    }

    /// Drains the socket into the receive queue, one `on_data` per chunk.
    fn on_readable(self: &Rc<Self>) {
        let mut scratch = self.scratch.borrow_mut();
        let mut total = 0usize;

        let end = loop {
            let received = {
                let state = self.state.borrow();
                let Some(socket) = state.socket.as_ref() else {
                    return;
                };

                socket.recv(&mut scratch).map(|n| (n, state.protocol))
            };

            match received {
                // An empty datagram is a message, not the end of the stream.
                Ok((0, Protocol::Udp)) => continue,
                Ok((0, _)) => break ReadEnd::Eof,
                Ok((n, _)) => {
                    total += n;
                    self.state.borrow_mut().rx_queue.append(&scratch[..n]);
                    tracing::trace!(bytes = n, "received");

                    self.emit_data();

                    if self.state.borrow().status != Status::Connected {
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break ReadEnd::Drained,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => break ReadEnd::Failed(e),
            }
        };

        drop(scratch);

        match end {
            ReadEnd::Drained => {}
            // Data came first: the socket stays readable and the end of
            // stream is reported on the next pass.
            ReadEnd::Eof if total > 0 => {}
            ReadEnd::Eof => {
                debug!(fd = self.state.borrow().fd(), "peer closed");
                self.terminate(None);
                self.emit_event(Events::EOF);
            }
            ReadEnd::Failed(e) => {
                warn!(fd = self.state.borrow().fd(), error = %e, "receive failed");
                self.fail(Error::Io(e), Events::EOF | Events::ERROR);
            }
        }
    }

    /// Moves queued Tcp bytes onto the socket.
    fn flush(self: &Rc<Self>) {
        let drained = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;

            if state.protocol != Protocol::Tcp {
                return;
            }

            let Some(socket) = state.socket.as_ref() else {
                return;
            };

            match io::drain(socket, &mut state.tx_queue) {
                Ok(true) => state
                    .watch
                    .map(|watch| self.reactor.set_interest(watch, state.wanted_interest()))
                    .unwrap_or(Ok(()))
                    .map(|()| true),
                other => other,
            }
        };

        match drained {
            Ok(true) => self.emit_sendable(),
            Ok(false) => {}
            Err(e) => {
                warn!(fd = self.state.borrow().fd(), error = %e, "send failed");
                self.fail(Error::Io(e), Events::ERROR);
            }
        }
    }

    /// Moves to `Closed`, releasing the socket, watch and timer. The queues
    /// stay readable until `close` or drop.
    ///
    /// Returns `false` if the connection was already closed.
    fn terminate(&self, cause: Option<Error>) -> bool {
        let mut state = self.state.borrow_mut();

        if state.status == Status::Closed {
            return false;
        }

        state.release(&self.reactor);
        state.status = Status::Closed;

        if cause.is_some() {
            state.last_error = cause;
        }

        true
    }

    /// Terminates with `cause` and reports `events`.
    fn fail(self: &Rc<Self>, cause: Error, events: Events) {
        if self.terminate(Some(cause)) {
            self.emit_event(events);
        }
    }

    fn replace_handler(&self, handler: Option<Box<dyn Handler>>) {
        self.handler_epoch.set(self.handler_epoch.get().wrapping_add(1));

        let previous = self.handler.replace(handler);
        drop(previous);
    }

    /// Runs `f` against the installed handler, if any.
    ///
    /// The handler is taken out for the duration of the call so that it
    /// may use the connection freely, and put back afterwards unless it was
    /// replaced meanwhile.
    fn with_handler(self: &Rc<Self>, f: impl FnOnce(&mut dyn Handler, &Connection)) {
        let taken = self.handler.borrow_mut().take();
        let Some(mut handler) = taken else {
            return;
        };

        let epoch = self.handler_epoch.get();
        let conn = Connection {
            shared: Rc::clone(self),
        };

        f(&mut *handler, &conn);

        if self.handler_epoch.get() == epoch {
            *self.handler.borrow_mut() = Some(handler);
        }
    }

    fn emit_event(self: &Rc<Self>, events: Events) {
        self.notify(Notice::Event(events));
    }

    fn emit_data(self: &Rc<Self>) {
        self.notify(Notice::Data);
    }

    fn emit_sendable(self: &Rc<Self>) {
        self.notify(Notice::Sendable);
    }

    /// Delivers `notice`, or queues it behind the callback already running
    /// so that nested notices arrive in order once it returns.
    fn notify(self: &Rc<Self>, notice: Notice) {
        if self.dispatching.get() {
            self.deferred.borrow_mut().push_back(notice);
            return;
        }

        self.dispatching.set(true);

        let mut next = Some(notice);
        while let Some(notice) = next {
            match notice {
                Notice::Data => self.with_handler(|handler, conn| handler.on_data(conn)),
                Notice::Sendable => self.with_handler(|handler, conn| handler.on_sendable(conn)),
                Notice::Event(events) => {
                    self.with_handler(|handler, conn| handler.on_event(conn, events))
                }
            }

            next = self.deferred.borrow_mut().pop_front();
        }

        self.dispatching.set(false);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.state.get_mut().release(&self.reactor);
    }
}
