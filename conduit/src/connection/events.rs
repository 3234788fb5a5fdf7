use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Connection state outcomes delivered to [`Handler::on_event`].
///
/// Flags combine, e.g. a connect timeout is reported as
/// `Events::ERROR | Events::TIMEOUT`.
///
/// [`Handler::on_event`]: crate::Handler::on_event
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Events(u8);

impl Events {
    /// The connect attempt succeeded, or an established socket was adopted.
    pub const CONNECTED: Events = Events(1 << 0);
    /// The connect attempt or the connection failed.
    pub const ERROR: Events = Events(1 << 1);
    /// The peer closed the stream.
    pub const EOF: Events = Events(1 << 2);
    /// The connect attempt ran out of time.
    pub const TIMEOUT: Events = Events(1 << 3);

    const NAMES: [(Events, &'static str); 4] = [
        (Events::CONNECTED, "CONNECTED"),
        (Events::ERROR, "ERROR"),
        (Events::EOF, "EOF"),
        (Events::TIMEOUT, "TIMEOUT"),
    ];

    pub const fn empty() -> Events {
        Events(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag of `other` is set in `self`.
    pub const fn contains(self, other: Events) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Events {
    type Output = Events;

    fn bitor(self, rhs: Events) -> Events {
        Events(self.0 | rhs.0)
    }
}

impl BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Events) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Events(")?;

        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }

        f.write_str(")")
    }
}
