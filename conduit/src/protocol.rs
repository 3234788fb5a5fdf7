//! Transport names.
//!
//! Maps the closed set of transports to the strings used at configuration
//! boundaries (`"udp"`, `"tcp"`, `"tls"`) and back.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// The transport a [`Connection`](crate::Connection) runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    /// Datagrams; every write is an independent send.
    Udp,
    /// Byte stream written straight to the socket.
    #[default]
    Tcp,
    /// Byte stream whose plaintext is queued for an external record layer.
    Tls,
}

/// Lookup table shared by both directions of the mapping.
const PROTOCOLS: [(Protocol, &str); 3] = [
    (Protocol::Udp, "udp"),
    (Protocol::Tcp, "tcp"),
    (Protocol::Tls, "tls"),
];

impl Protocol {
    /// Returns the canonical lowercase name of this transport.
    pub fn name(self) -> &'static str {
        PROTOCOLS
            .iter()
            .find(|(p, _)| *p == self)
            .map(|(_, name)| *name)
            .unwrap_or("unknown")
    }

    /// Looks up a transport by name, ignoring ASCII case.
    ///
    /// Anything unrecognised, including the empty string, is treated as
    /// [`Protocol::Tcp`].
    pub fn from_name(name: &str) -> Self {
        PROTOCOLS
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(p, _)| *p)
            .unwrap_or(Protocol::Tcp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for p in [Protocol::Udp, Protocol::Tcp, Protocol::Tls] {
            assert_eq!(Protocol::from_name(p.name()), p);
        }
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(Protocol::from_name("UDP"), Protocol::Udp);
        assert_eq!(Protocol::from_name("Tcp"), Protocol::Tcp);
        assert_eq!(Protocol::from_name("tLs"), Protocol::Tls);
    }

    #[test]
    fn test_unknown_defaults_to_tcp() {
        assert_eq!(Protocol::from_name(""), Protocol::Tcp);
        assert_eq!(Protocol::from_name("sctp"), Protocol::Tcp);
        assert_eq!(Protocol::from_name("udp "), Protocol::Tcp);
    }

    #[test]
    fn test_display_and_parse() {
        assert_eq!(Protocol::Tls.to_string(), "tls");
        assert_eq!("udp".parse::<Protocol>(), Ok(Protocol::Udp));
    }
}
