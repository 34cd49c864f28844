/// Core value types shared by routing, bootstrap and the driver
pub mod member;

pub use member::{LogicalMember, Topology};

use crate::error::{PasarelaError, PasarelaResult};
use std::fmt;
use std::io;
use std::net::SocketAddr;

/// A physical socket: host and port
///
/// Immutable; equality and hashing are by (host, port). The host is kept as
/// given (name or IP literal) and only resolved when dialed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint {
    host: String,
    port: u16,
}

/// Opaque per-member identifier presented to a shared ingress during the
/// TLS handshake
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutingToken(String);

impl Endpoint {
    /// Build an endpoint, rejecting an empty host or a port outside [1, 65535]
    pub fn new<H: Into<String>>(host: H, port: i64) -> PasarelaResult<Self> {
        let host = host.into();

        if host.trim().is_empty() {
            return Err(PasarelaError::invalid_endpoint(host, port, "host is empty"));
        }

        if !(1..=i64::from(u16::MAX)).contains(&port) {
            return Err(PasarelaError::invalid_endpoint(
                host,
                port,
                "port must be between 1 and 65535",
            ));
        }

        Ok(Self {
            host,
            port: port as u16,
        })
    }

    /// Parse `host:port`; IPv6 literals use brackets (`[::1]:9042`)
    pub fn parse(input: &str) -> PasarelaResult<Self> {
        let input = input.trim();

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, rest) = rest.split_once(']').ok_or_else(|| {
                PasarelaError::invalid_endpoint(input, 0, "unterminated IPv6 literal")
            })?;
            let port = rest.strip_prefix(':').ok_or_else(|| {
                PasarelaError::invalid_endpoint(input, 0, "missing port")
            })?;
            (host, port)
        } else {
            let (host, port) = input.rsplit_once(':').ok_or_else(|| {
                PasarelaError::invalid_endpoint(input, 0, "missing port")
            })?;
            if host.contains(':') {
                return Err(PasarelaError::invalid_endpoint(
                    input,
                    0,
                    "IPv6 literal must be bracketed",
                ));
            }
            (host, port)
        };

        let port: i64 = port.parse().map_err(|_| {
            PasarelaError::invalid_endpoint(host, 0, format!("invalid port '{port}'"))
        })?;

        Self::new(host, port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to socket addresses at dial time
    pub async fn to_socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .collect();

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{self} did not resolve to any address"),
            ));
        }

        Ok(addrs)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl RoutingToken {
    /// Build a token, rejecting empty identifiers
    pub fn new<S: Into<String>>(value: S) -> PasarelaResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(PasarelaError::unroutable("routing token is empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
