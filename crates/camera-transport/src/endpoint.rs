//! Endpoint parsing.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use url::{Host, Url};

use crate::error::TransportError;
use crate::TransportResult;

/// Transport protocol named by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Datagrams over UDP.
    Udp,
}

impl Scheme {
    /// URL scheme string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Udp => "udp",
        }
    }
}

/// A parsed network endpoint.
///
/// Accepts `udp://host:port` and bare `host:port` (treated as UDP).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parse an endpoint string.
    pub fn parse(input: &str) -> TransportResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint(
                "endpoint is empty".to_string(),
            ));
        }

        if input.contains("://") {
            Self::parse_url(input)
        } else {
            Self::parse_host_port(input)
        }
    }

    fn parse_url(input: &str) -> TransportResult<Self> {
        let url = Url::parse(input).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let scheme = match url.scheme() {
            "udp" => Scheme::Udp,
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "missing host in {input}"
                )))
            }
        };

        let port = url
            .port()
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("missing port in {input}")))?;

        Ok(Self { scheme, host, port })
    }

    fn parse_host_port(input: &str) -> TransportResult<Self> {
        if let Ok(addr) = input.parse::<SocketAddr>() {
            return Ok(Self {
                scheme: Scheme::Udp,
                host: addr.ip().to_string(),
                port: addr.port(),
            });
        }

        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("missing port in {input}")))?;

        if host.is_empty() || host.contains(':') {
            return Err(TransportError::InvalidEndpoint(format!(
                "invalid host in {input}"
            )));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| TransportError::InvalidEndpoint(format!("invalid port in {input}")))?;

        Ok(Self {
            scheme: Scheme::Udp,
            host: host.to_string(),
            port,
        })
    }

    /// Endpoint scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host name or address literal (IPv6 without brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", self.scheme.as_str(), self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", self.scheme.as_str(), self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_udp_url() {
        let endpoint = Endpoint::parse("udp://localhost:5000").unwrap();
        assert_eq!(endpoint.scheme(), Scheme::Udp);
        assert_eq!(endpoint.host(), "localhost");
        assert_eq!(endpoint.port(), 5000);
        assert_eq!(endpoint.to_string(), "udp://localhost:5000");
    }

    #[test]
    fn test_parse_ipv6_url() {
        let endpoint = Endpoint::parse("udp://[::1]:7000").unwrap();
        assert_eq!(endpoint.host(), "::1");
        assert_eq!(endpoint.to_string(), "udp://[::1]:7000");
    }

    #[test]
    fn test_parse_bare_host_port() {
        let endpoint = Endpoint::parse("127.0.0.1:5000").unwrap();
        assert_eq!(endpoint.host(), "127.0.0.1");
        assert_eq!(endpoint.port(), 5000);

        let endpoint: Endpoint = "camera-sink.local:9000".parse().unwrap();
        assert_eq!(endpoint.host(), "camera-sink.local");
        assert_eq!(endpoint.scheme(), Scheme::Udp);
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(
            Endpoint::parse("   "),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_rejects_missing_port() {
        assert!(Endpoint::parse("udp://localhost").is_err());
        assert!(Endpoint::parse("localhost").is_err());
        assert!(Endpoint::parse("localhost:http").is_err());
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            Endpoint::parse("rtmp://live.example.com:1935/app"),
            Err(TransportError::UnsupportedScheme(s)) if s == "rtmp"
        ));
    }
}
