use crate::connection::Connection;
use crate::protocol::Protocol;
use crate::reactor::Reactor;

/// Size of the scratch buffer used for each `recv` on the read path.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 4096;

/// Settings a [`Connection`] is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Transport hint.
    ///
    /// `Tls` puts a stream connection in record-layer mode: writes are
    /// queued for an external encryption layer instead of being sent.
    /// `Udp` and `Tcp` are informational, the actual transport is derived
    /// from the socket when connecting.
    pub protocol: Protocol,

    /// Bytes requested from the socket per `recv`, and therefore the
    /// largest chunk reported by a single `on_data` call.
    pub read_chunk_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Tcp,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

/// Builder for configuring and creating a connection.
///
/// # Examples
///
/// ```rust,ignore
/// let conn = ConnectionBuilder::new(&reactor)
///     .transport("tls")
///     .read_chunk_size(16 * 1024)
///     .build();
/// ```
pub struct ConnectionBuilder {
    reactor: Reactor,
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Creates a builder with the default configuration.
    pub fn new(reactor: &Reactor) -> Self {
        Self {
            reactor: reactor.clone(),
            config: ConnectionConfig::default(),
        }
    }

    /// Sets the transport hint.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    /// Sets the transport hint from its configuration name.
    ///
    /// Unknown names select `tcp`.
    pub fn transport(self, name: &str) -> Self {
        self.protocol(Protocol::from_name(name))
    }

    /// Sets the size of the receive scratch buffer.
    ///
    /// # Panics
    ///
    /// Panics if `size == 0`.
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        assert!(size > 0, "read_chunk_size must be > 0");

        self.config.read_chunk_size = size;
        self
    }

    /// Replaces the whole configuration.
    ///
    /// # Panics
    ///
    /// Panics if `config.read_chunk_size == 0`.
    pub fn config(self, config: ConnectionConfig) -> Self {
        let protocol = config.protocol;
        self.read_chunk_size(config.read_chunk_size)
            .protocol(protocol)
    }

    /// Builds the connection in the `New` state.
    pub fn build(self) -> Connection {
        Connection::with_config(&self.reactor, self.config)
    }
}
