use super::poller::Interest;

/// An I/O event reported by the poller.
///
/// The token identifies the watch inside the reactor. Error and hang-up
/// conditions are reported as both readable and writable so that whichever
/// side the watch listens on observes them.
pub(crate) struct Event {
    /// Token associated with the registered file descriptor.
    pub(crate) token: u64,

    /// Indicates that the file descriptor is readable.
    pub(crate) readable: bool,

    /// Indicates that the file descriptor is writable.
    pub(crate) writable: bool,
}

impl Event {
    /// Readiness as seen by a watch with the given interest.
    pub(crate) fn readiness(&self, interest: Interest) -> Readiness {
        Readiness {
            readable: self.readable && interest.read,
            writable: self.writable && interest.write,
        }
    }
}

/// Readiness delivered to a watch callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        !self.readable && !self.writable
    }
}
