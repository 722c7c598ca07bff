//! Datagram payload tagged with its peer address

use std::net::SocketAddr;

use bytes::Bytes;

/// A datagram together with its peer: the address it came from, or, when
/// sent into a server's reply sink, the address it goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Bytes,
    peer: SocketAddr,
}

impl Packet {
    pub fn new(payload: impl Into<Bytes>, peer: SocketAddr) -> Self {
        Self {
            payload: payload.into(),
            peer,
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

}
