//! Platform-specific I/O poller abstraction.
//!
//! The poller is used by the reactor to wait for I/O readiness, bounded
//! by the deadline of the next timer. The concrete implementation is
//! selected at compile time depending on the target operating system.

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

/// Readiness a watch is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    pub read: bool,
    pub write: bool,
}

impl Interest {
    /// Read readiness only.
    pub const READABLE: Interest = Interest {
        read: true,
        write: false,
    };

    /// Write readiness only.
    pub const WRITABLE: Interest = Interest {
        read: false,
        write: true,
    };

    /// Both read and write readiness.
    pub const BOTH: Interest = Interest {
        read: true,
        write: true,
    };
}
