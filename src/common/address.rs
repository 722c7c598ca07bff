//! Address type for datagram endpoints

use std::net::{IpAddr, SocketAddr};

use crate::error::{Error, Result};

/// Host used when the caller does not name one
pub const WILDCARD_HOST: &str = "0.0.0.0";

/// URI scheme accepted for datagram endpoints
pub const UDP_SCHEME: &str = "udp";

/// Network address representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// IP socket address (IP + port)
    Socket(SocketAddr),
    /// Domain name with port, resolved lazily
    Domain(String, u16),
}

impl Address {
    /// Build an address from an optional host and a port.
    ///
    /// A missing or empty host falls back to [`WILDCARD_HOST`].
    pub fn from_host_port(host: Option<&str>, port: u16) -> Self {
        let host = host.filter(|h| !h.is_empty()).unwrap_or(WILDCARD_HOST);
        Self::from_parts(host, port)
    }

    /// Parse `udp://host:port` or a bare `host:port`.
    ///
    /// IPv6 hosts must be bracketed (`udp://[::1]:9000`).
    pub fn parse_uri(uri: &str) -> Result<Self> {
        let rest = match uri.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case(UDP_SCHEME) => rest,
            Some((scheme, _)) => {
                return Err(Error::Unsupported(format!("URI scheme '{}' in {}", scheme, uri)));
            }
            None => uri,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| Error::Config(format!("URI {} has no port", uri)))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("bad port in {}", uri)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');

        Ok(Self::from_host_port(Some(host), port))
    }

    fn from_parts(host: &str, port: u16) -> Self {
        match host.parse::<IpAddr>() {
            Ok(ip) => Address::Socket(SocketAddr::new(ip, port)),
            Err(_) => Address::Domain(host.to_string(), port),
        }
    }

    /// Get the port
    pub fn port(&self) -> u16 {
        match self {
            Address::Socket(addr) => addr.port(),
            Address::Domain(_, port) => *port,
        }
    }

    /// Resolve to a concrete socket address, performing a DNS lookup for
    /// domain names. The first resolved address wins.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            Address::Socket(addr) => Ok(*addr),
            Address::Domain(domain, port) => tokio::net::lookup_host((domain.as_str(), *port))
                .await?
                .next()
                .ok_or_else(|| Error::InvalidAddress(format!("{} did not resolve", self))),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Address::Socket(addr) => write!(f, "{}", addr),
            Address::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Socket(addr)
    }
}

impl From<(&str, u16)> for Address {
    fn from((host, port): (&str, u16)) -> Self {
        Address::from_parts(host, port)
    }
}
