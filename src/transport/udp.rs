//! UDP client and server resources

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, error, trace};

use super::{Client, Server, UdpOptions};
use crate::common::{deferred, Address, Packet, SharedError};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::resource::TaskResource;
use crate::stream::{Subscription, WeakSource};

/// Maximum UDP payload size
pub const MAX_DATAGRAM: usize = 65_535;

impl Context {
    /// Create a UDP client sending to the configured target.
    ///
    /// The socket is connected in the background; items sent into
    /// `outgoing` before that are queued and written once it is. A failed
    /// write is logged and the sink stays open. Finishing `outgoing`
    /// closes the socket. With `duplex`, a receive error fails `incoming`
    /// and then `outgoing`, which closes the socket too.
    pub fn udp_client(&self, label: &str, options: UdpOptions) -> Result<Client> {
        let target = options.target()?;
        let outgoing = self.sink::<Bytes>(label);
        let incoming = options
            .duplex
            .then(|| self.source::<Packet>(&format!("{}.incoming", label)));

        let (connection, connected) = deferred();
        let feed = outgoing.feed().subscribe();
        let weak_outgoing = outgoing.feed().downgrade();
        let weak_incoming = incoming.as_ref().map(|source| source.downgrade());
        let label = outgoing.label().to_string();

        let task = self.spawn(async move {
            let socket = match connect(&target).await {
                Ok(socket) => socket,
                Err(e) => {
                    error!("[{}] Failed to connect to {}: {}", label, target, e);
                    let e: SharedError = Arc::new(e);
                    connection.resolve(Err(e.clone()));
                    if let Some(incoming) = weak_incoming.as_ref().and_then(WeakSource::upgrade) {
                        incoming.fail(e.clone());
                    }
                    if let Some(outgoing) = weak_outgoing.upgrade() {
                        outgoing.fail(e);
                    }
                    return;
                }
            };
            let peer = socket.peer_addr().ok();
            debug!("[{}] Connected to {} ({:?})", label, target, peer);
            connection.resolve(peer.ok_or_else(|| {
                Arc::new(Error::InvalidAddress(format!("{} has no peer address", target)))
            }));

            let writer = async {
                let mut feed = feed;
                while let Some(Ok(payload)) = feed.next().await {
                    match socket.send(&payload).await {
                        Ok(n) => trace!("[{}] Sent {} bytes to {}", label, n, target),
                        Err(e) => error!("[{}] Send to {} failed: {}", label, target, e),
                    }
                }
            };
            let reader = async {
                let Some(weak_incoming) = weak_incoming.as_ref() else {
                    return;
                };
                let Some(from) = peer else { return };
                let mut buf = vec![0u8; MAX_DATAGRAM];
                loop {
                    let received = socket.recv(&mut buf).await;
                    if !deliver(&label, weak_incoming, received.map(|n| (n, from)), &buf) {
                        break;
                    }
                }
            };
            tokio::join!(writer, reader);
        });

        let resource = Arc::new(TaskResource::with_task("udp-client", task.abort_handle()));
        let incoming_on_detach = incoming.as_ref().map(|source| source.downgrade());
        self.bind_with(resource, outgoing.feed(), move |ctx, id| {
            if let Some(ctx) = ctx {
                ctx.detach(id);
            }
            if let Some(incoming) = incoming_on_detach.as_ref().and_then(WeakSource::upgrade) {
                incoming.finish();
            }
        });
        if let Some(incoming) = incoming.as_ref() {
            let weak_outgoing = outgoing.feed().downgrade();
            incoming.on_complete(move |outcome| {
                if let (Err(e), Some(outgoing)) = (outcome, weak_outgoing.upgrade()) {
                    outgoing.fail(e.clone());
                }
            });
        }

        Ok(Client::new(outgoing, incoming, connected))
    }

    /// Create a UDP server bound to the configured address.
    ///
    /// `port` resolves once the socket is bound (port 0 picks an ephemeral
    /// port). Each datagram becomes a [`Packet`] on `incoming`; a receive
    /// error fails `incoming`. Finishing `incoming` closes the socket.
    pub fn udp_server(&self, label: &str, options: UdpOptions) -> Result<Server> {
        let bind_address = options.bind_address()?;
        let incoming = self.source::<Packet>(label);
        let replies = self.sink::<Packet>(&format!("{}.replies", label));

        let (port, bound) = deferred();
        let feed = replies.feed().subscribe();
        let weak_incoming = incoming.downgrade();
        let label = incoming.label().to_string();
        // The task keeps the reply sink open for as long as the socket lives.
        let task_replies = replies.clone();

        let task = self.spawn(async move {
            let socket = match bind(&bind_address).await {
                Ok(socket) => socket,
                Err(e) => {
                    error!("[{}] Failed to bind {}: {}", label, bind_address, e);
                    let e: SharedError = Arc::new(e);
                    port.resolve(Err(e.clone()));
                    if let Some(incoming) = weak_incoming.upgrade() {
                        incoming.fail(e);
                    }
                    return;
                }
            };
            let local = match socket.local_addr() {
                Ok(local) => local,
                Err(e) => {
                    let e: SharedError = Arc::new(Error::Io(e));
                    port.resolve(Err(e.clone()));
                    if let Some(incoming) = weak_incoming.upgrade() {
                        incoming.fail(e);
                    }
                    return;
                }
            };
            debug!("[{}] Listening on {}", label, local);
            port.resolve(Ok(local.port()));

            let receiver = async {
                let mut buf = vec![0u8; MAX_DATAGRAM];
                loop {
                    let received = socket.recv_from(&mut buf).await;
                    if !deliver(&label, &weak_incoming, received, &buf) {
                        break;
                    }
                }
            };
            let sender = send_replies(&label, &socket, feed);
            tokio::join!(receiver, sender);
            drop(task_replies);
        });

        let resource = Arc::new(TaskResource::with_task("udp-server", task.abort_handle()));
        let weak_replies = replies.feed().downgrade();
        self.bind_with(resource, &incoming, move |ctx, id| {
            if let Some(ctx) = ctx {
                ctx.detach(id);
            }
            if let Some(replies) = weak_replies.upgrade() {
                replies.finish();
            }
        });

        let outgoing = options.duplex.then_some(replies);
        Ok(Server {
            port: bound,
            incoming,
            outgoing,
        })
    }
}

/// Push one receive result into `incoming`. Returns `false` when receiving
/// should stop.
fn deliver(
    label: &str,
    incoming: &WeakSource<Packet>,
    received: std::io::Result<(usize, SocketAddr)>,
    buf: &[u8],
) -> bool {
    let Some(incoming) = incoming.upgrade() else {
        return false;
    };
    match received {
        Ok((n, from)) => {
            trace!("[{}] Received {} bytes from {}", label, n, from);
            incoming.emit(Packet::new(Bytes::copy_from_slice(&buf[..n]), from))
        }
        Err(e) => {
            error!("[{}] Receive error: {}", label, e);
            incoming.fail(Error::Io(e));
            false
        }
    }
}

async fn send_replies(label: &str, socket: &UdpSocket, mut feed: Subscription<Packet>) {
    while let Some(Ok(packet)) = feed.next().await {
        if let Err(e) = socket.send_to(packet.payload(), packet.peer()).await {
            error!("[{}] Reply to {} failed: {}", label, packet.peer(), e);
        }
    }
}

async fn bind(address: &Address) -> Result<UdpSocket> {
    let local = address.resolve().await?;
    Ok(UdpSocket::bind(local).await?)
}

async fn connect(target: &Address) -> Result<UdpSocket> {
    let remote = target.resolve().await?;
    let local = match remote.ip() {
        IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(remote).await?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn loopback_server(ctx: &Context, options: UdpOptions) -> (Server, SocketAddr) {
        let server = ctx
            .udp_server("server", UdpOptions { host: Some("127.0.0.1".into()), ..options })
            .unwrap();
        let port = server.bound_port().await.unwrap();
        (server, SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[tokio::test]
    async fn test_ephemeral_port_resolves() {
        let ctx = Context::new("ctx").unwrap();
        let server = ctx.udp_server("server", UdpOptions::port(0)).unwrap();
        let port = server.bound_port().await.unwrap();
        assert_ne!(port, 0);
        assert!(server.outgoing.is_none());
        assert_eq!(ctx.child_count(), 1);
    }

    #[tokio::test]
    async fn test_datagram_becomes_packet() {
        let ctx = Context::new("ctx").unwrap();
        let (server, addr) = loopback_server(&ctx, UdpOptions::default()).await;
        let mut incoming = server.incoming.subscribe();

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"hello", addr).await.unwrap();

        let packet = incoming.next().await.unwrap().unwrap();
        assert_eq!(packet, Packet::new(&b"hello"[..], peer.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn test_client_sends_to_server() {
        let ctx = Context::new("ctx").unwrap();
        let (server, addr) = loopback_server(&ctx, UdpOptions::default()).await;
        let mut incoming = server.incoming.subscribe();

        let client = ctx
            .udp_client("client", UdpOptions::uri(format!("udp://{}", addr)))
            .unwrap();
        assert!(client.incoming.is_none());

        // Queued before the connection is up
        client.outgoing.send(Bytes::from_static(b"one"));
        assert_eq!(client.connected().await.unwrap(), addr);
        client.outgoing.send(Bytes::from_static(b"two"));

        let first = incoming.next().await.unwrap().unwrap();
        let second = incoming.next().await.unwrap().unwrap();
        assert_eq!(first.payload(), &Bytes::from_static(b"one"));
        assert_eq!(second.payload(), &Bytes::from_static(b"two"));
        assert_eq!(first.peer(), second.peer());
    }

    #[tokio::test]
    async fn test_duplex_echo() {
        let ctx = Context::new("ctx").unwrap();
        let (server, addr) = loopback_server(&ctx, UdpOptions::default().duplex()).await;
        let replies = server.outgoing.clone().unwrap();
        let mut requests = server.incoming.subscribe();

        let client = ctx
            .udp_client("client", UdpOptions::host_port("127.0.0.1", addr.port()).duplex())
            .unwrap();
        let mut answers = client.incoming.as_ref().unwrap().subscribe();
        client.connected().await.unwrap();
        client.outgoing.send(Bytes::from_static(b"ping"));

        let request = requests.next().await.unwrap().unwrap();
        replies.send(Packet::new(&b"pong"[..], request.peer()));

        let answer = answers.next().await.unwrap().unwrap();
        assert_eq!(answer.payload(), &Bytes::from_static(b"pong"));
        assert_eq!(answer.peer(), addr);
    }

    #[tokio::test]
    async fn test_finishing_streams_detaches_sockets() {
        let ctx = Context::new("ctx").unwrap();
        let (server, addr) = loopback_server(&ctx, UdpOptions::default()).await;
        let client = ctx
            .udp_client("client", UdpOptions::uri(addr.to_string()).duplex())
            .unwrap();
        assert_eq!(ctx.child_count(), 2);

        client.outgoing.finish();
        assert_eq!(ctx.child_count(), 1);
        let incoming = client.incoming.as_ref().unwrap();
        assert!(incoming.completion().await.is_ok());

        server.incoming.finish();
        assert_eq!(ctx.child_count(), 0);
    }

    #[tokio::test]
    async fn test_receive_error_fails_incoming_and_detaches() {
        let ctx = Context::new("ctx").unwrap();
        let closed = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);

        let client = ctx
            .udp_client("client", UdpOptions::host_port("127.0.0.1", port).duplex())
            .unwrap();
        let mut received = client.incoming.as_ref().unwrap().subscribe();
        client.connected().await.unwrap();
        assert_eq!(ctx.child_count(), 1);

        // Nobody listens, so the connected socket reports the refusal on recv
        client.outgoing.send(Bytes::from_static(b"anyone?"));
        let err = tokio::time::timeout(Duration::from_secs(5), received.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(*err, Error::Io(_)));
        assert!(received.next().await.is_none());

        assert!(client.outgoing.completion().await.is_err());
        assert_eq!(ctx.child_count(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_incoming() {
        let ctx = Context::new("ctx").unwrap();
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let server = ctx
            .udp_server("server", UdpOptions::host_port("127.0.0.1", port))
            .unwrap();
        assert!(server.bound_port().await.is_err());
        let outcome = tokio::time::timeout(Duration::from_secs(5), server.incoming.completion())
            .await
            .unwrap();
        assert!(outcome.is_err());
        assert_eq!(ctx.child_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_scheme_is_raised() {
        let ctx = Context::new("ctx").unwrap();
        let result = ctx.udp_client("client", UdpOptions::uri("tcp://127.0.0.1:1"));
        assert!(matches!(result, Err(Error::Unsupported(_))));
        assert_eq!(ctx.child_count(), 0);
    }
}
