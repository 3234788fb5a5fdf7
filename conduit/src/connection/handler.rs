use super::Connection;
use super::events::Events;

/// Receives notifications from a [`Connection`].
///
/// The implementing type is the owner's context: whatever state the
/// callbacks need lives in `self`. All methods run on the reactor thread.
///
/// Callbacks may call back into the connection, including
/// [`Connection::close`] and [`Connection::set_handler`]. A handler that is
/// replaced from inside one of its own callbacks is dropped once that
/// callback returns.
///
/// Callbacks never nest. A notification raised from inside a callback, such
/// as the `ERROR` of a retried [`Connection::connect`] that fails at once,
/// is delivered after the running callback returns, to whichever handler is
/// installed by then.
///
/// Storing a clone of the connection inside its own handler creates a
/// reference cycle; close the connection explicitly in that case.
pub trait Handler {
    /// Called once for every chunk appended to the receive queue.
    fn on_data(&mut self, conn: &Connection) {
        let _ = conn;
    }

    /// Called when all bytes queued by [`Connection::write`] have reached
    /// the socket.
    fn on_sendable(&mut self, conn: &Connection) {
        let _ = conn;
    }

    /// Called when the connection changes state.
    fn on_event(&mut self, conn: &Connection, events: Events);
}

type DataFn = Box<dyn FnMut(&Connection)>;
type EventFn = Box<dyn FnMut(&Connection, Events)>;

/// A [`Handler`] assembled from closures.
///
/// ```rust,ignore
/// conn.set_handler(
///     Callbacks::new()
///         .on_data(|conn| println!("{} bytes", conn.available()))
///         .on_event(|_, events| println!("{events:?}")),
/// );
/// ```
#[derive(Default)]
pub struct Callbacks {
    on_data: Option<DataFn>,
    on_sendable: Option<DataFn>,
    on_event: Option<EventFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Connection) + 'static,
    {
        self.on_data = Some(Box::new(f));
        self
    }

    pub fn on_sendable<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Connection) + 'static,
    {
        self.on_sendable = Some(Box::new(f));
        self
    }

    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Connection, Events) + 'static,
    {
        self.on_event = Some(Box::new(f));
        self
    }
}

impl Handler for Callbacks {
    fn on_data(&mut self, conn: &Connection) {
        if let Some(f) = self.on_data.as_mut() {
            f(conn);
        }
    }

    fn on_sendable(&mut self, conn: &Connection) {
        if let Some(f) = self.on_sendable.as_mut() {
            f(conn);
        }
    }

    fn on_event(&mut self, conn: &Connection, events: Events) {
        if let Some(f) = self.on_event.as_mut() {
            f(conn, events);
        }
    }
}
