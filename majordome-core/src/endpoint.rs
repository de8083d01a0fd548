//! Endpoint addressing for the broker transport.
//!
//! The transport runs over TCP only; endpoints are written `tcp://host:port`
//! (the scheme may be omitted).

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

/// Transport endpoint address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Parse an endpoint from a string.
    ///
    /// Accepted formats:
    /// - `tcp://127.0.0.1:5555`
    /// - `tcp://[::1]:5555` (IPv6)
    /// - `127.0.0.1:5555` (bare address)
    ///
    /// # Examples
    ///
    /// ```
    /// use majordome_core::endpoint::Endpoint;
    ///
    /// let a = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
    /// let b = Endpoint::parse("127.0.0.1:5555").unwrap();
    /// assert_eq!(a, b);
    /// ```
    pub fn parse(s: &str) -> Result<Self, EndpointError> {
        s.parse()
    }

    /// The socket address to dial or bind.
    #[inline]
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr = s.strip_prefix("tcp://").unwrap_or(s);
        if addr.contains("://") {
            return Err(EndpointError::UnsupportedScheme(s.to_string()));
        }
        addr.parse::<SocketAddr>()
            .map(Endpoint)
            .map_err(|_| EndpointError::InvalidAddress(addr.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}", self.0)
    }
}

/// Errors that can occur when parsing endpoints.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Unsupported scheme in endpoint: {0} (only tcp:// is available)")]
    UnsupportedScheme(String),

    #[error("Invalid TCP address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_scheme() {
        let ep = Endpoint::parse("tcp://127.0.0.1:5555").unwrap();
        assert_eq!(ep.to_string(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn parses_bare_address() {
        let ep = Endpoint::parse("127.0.0.1:40000").unwrap();
        assert_eq!(ep.addr().port(), 40000);
    }

    #[test]
    fn parses_ipv6() {
        let ep = Endpoint::parse("tcp://[::1]:5555").unwrap();
        assert!(ep.addr().is_ipv6());
    }

    #[test]
    fn rejects_foreign_scheme() {
        assert!(matches!(
            Endpoint::parse("ipc:///tmp/sock"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn rejects_missing_port() {
        assert!(matches!(
            Endpoint::parse("tcp://127.0.0.1"),
            Err(EndpointError::InvalidAddress(_))
        ));
    }
}
