//! Tagged address variant over IPv4, IPv6, and Unix domain sockets.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// An address identifying one endpoint of a connection.
///
/// Equality and hashing are over `(ip, port)` for the network variants; a
/// malformed string parses to [`Address::Unknown`] rather than failing,
/// matching the "invalid inputs yield `Type=Unknown`" testable property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    Uds(String),
    Unknown,
}

impl Address {
    /// Parses `"1.2.3.4:80"` or `"[::1]:80"`, falling back to
    /// [`Address::Unknown`] on any malformed input rather than erroring.
    pub fn parse(s: &str) -> Address {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return match addr {
                SocketAddr::V4(v4) => Address::V4(v4),
                SocketAddr::V6(v6) => Address::V6(v6),
            };
        }
        Address::Unknown
    }

    /// Builds an address from a raw IP/port pair.
    #[inline]
    pub fn from_ipv4(ip: Ipv4Addr, port: u16) -> Address {
        Address::V4(SocketAddrV4::new(ip, port))
    }

    #[inline]
    pub fn from_ipv6(ip: Ipv6Addr, port: u16) -> Address {
        Address::V6(SocketAddrV6::new(ip, port, 0, 0))
    }

    /// Size in bytes of the platform `sockaddr` this address corresponds
    /// to: 16 for `sockaddr_in`, 28 for `sockaddr_in6`. UDS/Unknown have no
    /// fixed-size sockaddr representation here and return `None`.
    pub fn sockaddr_len(&self) -> Option<usize> {
        match self {
            Address::V4(_) => Some(16),
            Address::V6(_) => Some(28),
            Address::Uds(_) | Address::Unknown => None,
        }
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Address::Unknown)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::V4(v4) => write!(f, "{}:{}", v4.ip(), v4.port()),
            Address::V6(v6) => write!(f, "[{}]:{}", v6.ip(), v6.port()),
            Address::Uds(path) => write!(f, "unix:{path}"),
            Address::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Address::V4(v4),
            SocketAddr::V6(v6) => Address::V6(v6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v4_round_trips() {
        let addr = Address::parse("1.2.3.4:80");
        assert_eq!(addr.to_string(), "1.2.3.4:80");
        assert_eq!(addr.sockaddr_len(), Some(16));
    }

    #[test]
    fn v6_round_trips_s3() {
        // S3: "[1:2:3:4:5:6:7:8]:1357" -> IPv6, port 1357, 28-byte struct.
        let addr = Address::parse("[1:2:3:4:5:6:7:8]:1357");
        match &addr {
            Address::V6(v6) => assert_eq!(v6.port(), 1357),
            other => panic!("expected V6, got {other:?}"),
        }
        assert_eq!(addr.sockaddr_len(), Some(28));
        assert_eq!(addr.to_string(), "[1:2:3:4:5:6:7:8]:1357");
    }

    #[test]
    fn invalid_input_yields_unknown() {
        for bad in ["", "not-an-address", "1.2.3.4", "[::1]", "1.2.3.4:not-a-port"] {
            assert_eq!(Address::parse(bad), Address::Unknown, "input: {bad:?}");
        }
    }

    #[test]
    fn equality_and_hash_are_over_ip_and_port() {
        use std::collections::HashSet;

        let a = Address::parse("10.0.0.1:9000");
        let b = Address::parse("10.0.0.1:9000");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    // Property 1 from the spec's testable-properties list, sampled over a
    // small well-formed grid rather than an exhaustive search.
    #[test]
    fn address_round_trip_property_sample() {
        let cases = [
            (Ipv4Addr::new(127, 0, 0, 1), 8080u16),
            (Ipv4Addr::new(0, 0, 0, 0), 1),
            (Ipv4Addr::new(255, 255, 255, 255), 65535),
        ];
        for (ip, port) in cases {
            let original = Address::from_ipv4(ip, port);
            let parsed = Address::parse(&original.to_string());
            assert_eq!(parsed, original);
        }
    }
}
