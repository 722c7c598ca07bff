//! Transport Layer
//!
//! Responsibilities:
//! - Own datagram sockets as context resources
//! - Move raw bytes between sockets and streams
//! - NO framing beyond tagging datagrams with their peer address
//!
//! The base client only sends and the base server only receives; the
//! reverse direction is exposed only when [`UdpOptions::duplex`] is set.

mod udp;

pub use udp::MAX_DATAGRAM;

use std::net::SocketAddr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::common::{Address, Deferred, Packet, SharedError};
use crate::error::{Error, Result};
use crate::stream::{Sink, Source};

/// Where a UDP client sends or a UDP server listens.
///
/// Either `uri` (`udp://host:port` or `host:port`) or `host`/`port`; mixing
/// them is a configuration error. `host` defaults to the wildcard address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UdpOptions {
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Also expose the reverse channel (client `incoming`, server `outgoing`)
    #[serde(default)]
    pub duplex: bool,
}

impl UdpOptions {
    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Default::default()
        }
    }

    pub fn host_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    /// Listen on `port` on every interface (0 for an ephemeral port)
    pub fn port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Default::default()
        }
    }

    pub fn duplex(mut self) -> Self {
        self.duplex = true;
        self
    }

    /// Address a client sends to; a port is required
    pub fn target(&self) -> Result<Address> {
        self.address(None)
    }

    /// Address a server binds; the port defaults to 0 (ephemeral)
    pub fn bind_address(&self) -> Result<Address> {
        self.address(Some(0))
    }

    fn address(&self, default_port: Option<u16>) -> Result<Address> {
        match (&self.uri, &self.host, self.port) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => Err(Error::Config(
                "'uri' cannot be combined with 'host' or 'port'".into(),
            )),
            (Some(uri), None, None) => Address::parse_uri(uri),
            (None, host, port) => {
                let port = port
                    .or(default_port)
                    .ok_or_else(|| Error::Config("UDP options need a 'uri' or a 'port'".into()))?;
                Ok(Address::from_host_port(host.as_deref(), port))
            }
        }
    }
}

/// The sending end of a UDP client
#[derive(Debug, Clone)]
pub struct Client {
    /// Every item sent here is written to the connected socket
    pub outgoing: Sink<Bytes>,
    /// Datagrams received from the peer; `None` unless duplex
    pub incoming: Option<Source<Packet>>,
    connection: Deferred<std::result::Result<SocketAddr, SharedError>>,
}

impl Client {
    pub(crate) fn new(
        outgoing: Sink<Bytes>,
        incoming: Option<Source<Packet>>,
        connection: Deferred<std::result::Result<SocketAddr, SharedError>>,
    ) -> Self {
        Self {
            outgoing,
            incoming,
            connection,
        }
    }

    /// Resolves with the peer address once the socket is connected
    pub async fn connected(&self) -> std::result::Result<SocketAddr, SharedError> {
        let label = self.outgoing.label().to_string();
        self.connection
            .wait()
            .await
            .unwrap_or_else(|| Err(Error::Detached(label).into()))
    }
}

/// The receiving end of a UDP server
#[derive(Debug, Clone)]
pub struct Server {
    /// Resolves with the bound port, or the bind error
    pub port: Deferred<std::result::Result<u16, SharedError>>,
    /// One packet per datagram received
    pub incoming: Source<Packet>,
    /// Replies, written to each packet's `from` address; `None` unless duplex
    pub outgoing: Option<Sink<Packet>>,
}

impl Server {
    /// Wait for the bound port
    pub async fn bound_port(&self) -> std::result::Result<u16, SharedError> {
        let label = self.incoming.label().to_string();
        self.port
            .wait()
            .await
            .unwrap_or_else(|| Err(Error::Detached(label).into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults_to_wildcard_ephemeral() {
        let addr = UdpOptions::default().bind_address().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:0");
    }

    #[test]
    fn test_client_requires_port() {
        assert!(matches!(UdpOptions::default().target(), Err(Error::Config(_))));
        let addr = UdpOptions::host_port("127.0.0.1", 9).target().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:9");
    }

    #[test]
    fn test_uri_excludes_host_port() {
        let mut options = UdpOptions::uri("udp://127.0.0.1:9");
        assert!(options.target().is_ok());
        options.port = Some(10);
        assert!(matches!(options.target(), Err(Error::Config(_))));
    }

    #[test]
    fn test_options_from_json() {
        let options: UdpOptions =
            serde_json::from_str(r#"{"host": "::1", "port": 5353, "duplex": true}"#).unwrap();
        assert!(options.duplex);
        assert_eq!(options.target().unwrap().to_string(), "[::1]:5353");

        assert!(serde_json::from_str::<UdpOptions>(r#"{"port": 1, "ttl": 4}"#).is_err());
    }
}
