//! TCP server driver.
//!
//! One task accepts peers and one lightweight task per connection reads
//! bounded chunks, so many idle clients never cost a kernel thread each.
//! Lifecycle order matches the layer contract: validate port at construction,
//! probe endpoint availability, bind (permission failures distinguished),
//! fire `bind`, then serve until the shutdown flag flips.

use crate::error::{NetworkError, Result};
use crate::event::EventHandlers;
use crate::table::{ConnectionId, ConnectionTable, Outbound};
use crate::{validate_port, Server, READ_BUFFER_SIZE};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

pub struct TcpServer {
    host: String,
    port: u16,
    handlers: Arc<EventHandlers>,
    table: ConnectionTable,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for TcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpServer")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl TcpServer {
    /// Construct a server bound to nothing yet. Fails fast on an invalid
    /// port; socket-level checks happen in [`Server::serve`].
    pub fn new(
        host: impl Into<String>,
        port: u16,
        handlers: EventHandlers,
        table: ConnectionTable,
    ) -> Result<Self> {
        validate_port(port)?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            host: host.into(),
            port,
            handlers: Arc::new(handlers),
            table,
            shutdown_tx,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pre-flight probe: a successful connect means something is already
    /// serving this endpoint.
    async fn check_availability(&self) -> Result<()> {
        if TcpStream::connect(self.endpoint()).await.is_ok() {
            return Err(NetworkError::availability(
                self.endpoint(),
                "endpoint is already in use",
            ));
        }
        Ok(())
    }

    async fn bind_listener(&self) -> Result<TcpListener> {
        TcpListener::bind(self.endpoint()).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => NetworkError::permission(format!(
                "binding {} requires elevated rights",
                self.endpoint()
            )),
            std::io::ErrorKind::AddrInUse => {
                NetworkError::availability(self.endpoint(), "endpoint is already in use")
            }
            _ => NetworkError::bind(format!("failed to bind {}", self.endpoint()), e),
        })
    }

    fn accept_connection(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let id = self
            .table
            .register(peer_addr, Outbound::Stream(Arc::new(Mutex::new(write_half))));

        info!(connection = %id, peer = %peer_addr, "accepted connection");
        (self.handlers.on_join)(id, peer_addr);

        let table = self.table.clone();
        let handlers = Arc::clone(&self.handlers);
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(read_loop(read_half, id, table, handlers, shutdown_rx));
    }

    async fn close_all(&self) {
        for id in self.table.ids() {
            match self.table.close(id).await {
                Ok(Some(_)) => (self.handlers.on_disconnect)(id),
                Ok(None) => {}
                Err(e) => {
                    // The entry is already unregistered; disconnect still
                    // fires so collaborators release the connection's state.
                    warn!(connection = %id, error = %e, "close during shutdown failed");
                    (self.handlers.on_disconnect)(id);
                }
            }
        }
    }
}

#[async_trait]
impl Server for TcpServer {
    async fn serve(&self) -> Result<()> {
        self.check_availability().await?;
        let listener = self.bind_listener().await?;
        let local_addr = listener.local_addr().map_err(|e| {
            NetworkError::bind("failed to resolve bound address", e)
        })?;

        info!(addr = %local_addr, "listening");
        (self.handlers.on_bind)(local_addr);

        // wait_for is level-triggered, so a shutdown requested before this
        // subscription still terminates the loop.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.accept_connection(stream, peer_addr),
                    Err(e) => error!(error = %e, "accept failed"),
                },
            }
        }

        debug!("shutdown observed, closing connections");
        self.close_all().await;
        Ok(())
    }

    fn connections(&self) -> ConnectionTable {
        self.table.clone()
    }

    fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn close_connection(&self, id: ConnectionId) -> Result<()> {
        if self.table.close(id).await?.is_some() {
            (self.handlers.on_disconnect)(id);
        }
        Ok(())
    }
}

/// Per-connection read loop. A zero-byte read means the peer closed: the
/// connection is unregistered and `disconnect` fires, so stale identities do
/// not linger in the contact book.
async fn read_loop(
    mut read_half: OwnedReadHalf,
    id: ConnectionId,
    table: ConnectionTable,
    handlers: Arc<EventHandlers>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            // The async block drops the non-Send watch::Ref returned by
            // `wait_for` before any await in the other arm, keeping the
            // spawned future Send.
            _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => return,
            read = read_half.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(connection = %id, "peer closed");
                    close_and_notify(&table, &handlers, id).await;
                    return;
                }
                Ok(n) => {
                    let text = decode_chunk(&buf[..n]);
                    (handlers.on_message)(id, text);
                }
                Err(e) => {
                    warn!(connection = %id, error = %e, "read failed");
                    close_and_notify(&table, &handlers, id).await;
                    return;
                }
            },
        }
    }
}

async fn close_and_notify(table: &ConnectionTable, handlers: &EventHandlers, id: ConnectionId) {
    match table.close(id).await {
        Ok(Some(_)) => (handlers.on_disconnect)(id),
        Ok(None) => {}
        Err(e) => {
            warn!(connection = %id, error = %e, "close after peer disconnect failed");
            (handlers.on_disconnect)(id);
        }
    }
}

/// Decode one chunk as UTF-8, falling back to a lossy representation, and
/// strip trailing line terminators. Reassembly of payloads beyond one chunk
/// is left to the line-oriented protocol above.
pub(crate) fn decode_chunk(chunk: &[u8]) -> String {
    String::from_utf8_lossy(chunk)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[derive(Debug, PartialEq)]
    enum Seen {
        Bind,
        Join(ConnectionId),
        Message(ConnectionId, String),
        Disconnect(ConnectionId),
    }

    fn recording_handlers() -> (EventHandlers, mpsc::Receiver<Seen>) {
        let (tx, rx) = mpsc::channel();
        let (t1, t2, t3, t4) = (tx.clone(), tx.clone(), tx.clone(), tx);
        let handlers = EventHandlers::builder()
            .on_bind(move |_| t1.send(Seen::Bind).unwrap())
            .on_join(move |id, _| t2.send(Seen::Join(id)).unwrap())
            .on_message(move |id, text| t3.send(Seen::Message(id, text)).unwrap())
            .on_disconnect(move |id| t4.send(Seen::Disconnect(id)).unwrap())
            .build();
        (handlers, rx)
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn wait_for(rx: &mpsc::Receiver<Seen>) -> Seen {
        rx.recv_timeout(Duration::from_secs(2)).expect("event not observed")
    }

    #[test]
    fn port_zero_is_a_configuration_error() {
        let err = TcpServer::new(
            "127.0.0.1",
            0,
            EventHandlers::default(),
            ConnectionTable::new(),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::Configuration { .. }));
    }

    #[tokio::test]
    async fn occupied_endpoint_is_an_availability_error() {
        let occupant = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupant.local_addr().unwrap().port();

        let server = TcpServer::new(
            "127.0.0.1",
            port,
            EventHandlers::default(),
            ConnectionTable::new(),
        )
        .unwrap();
        let err = server.serve().await.unwrap_err();
        assert!(matches!(err, NetworkError::Availability { .. }));
    }

    // These tests block on a std mpsc receiver, so the server task needs a
    // worker thread of its own.
    #[tokio::test(flavor = "multi_thread")]
    async fn event_flow_join_message_disconnect() {
        let (handlers, rx) = recording_handlers();
        let port = free_port();
        let server = Arc::new(
            TcpServer::new("127.0.0.1", port, handlers, ConnectionTable::new()).unwrap(),
        );
        let serve_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve().await })
        };

        assert_eq!(wait_for(&rx), Seen::Bind);

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let Seen::Join(id) = wait_for(&rx) else {
            panic!("expected join");
        };

        client.write_all(b"ping\r\n").await.unwrap();
        assert_eq!(wait_for(&rx), Seen::Message(id, "ping".to_string()));

        // Peer close must unregister the connection and fire disconnect.
        drop(client);
        assert_eq!(wait_for(&rx), Seen::Disconnect(id));
        assert!(server.connections().is_empty());

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(1), serve_task)
            .await
            .expect("serve did not stop within the latency bound")
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_fires_disconnect_for_every_live_connection() {
        let (handlers, rx) = recording_handlers();
        let port = free_port();
        let server = Arc::new(
            TcpServer::new("127.0.0.1", port, handlers, ConnectionTable::new()).unwrap(),
        );
        let serve_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve().await })
        };
        assert_eq!(wait_for(&rx), Seen::Bind);

        let _client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let Seen::Join(id) = wait_for(&rx) else {
            panic!("expected join");
        };

        server.shutdown();
        assert_eq!(wait_for(&rx), Seen::Disconnect(id));
        assert!(server.connections().is_empty());

        tokio::time::timeout(Duration::from_secs(1), serve_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn send_reaches_the_peer_in_full() {
        let (handlers, rx) = recording_handlers();
        let port = free_port();
        let server = Arc::new(
            TcpServer::new("127.0.0.1", port, handlers, ConnectionTable::new()).unwrap(),
        );
        let serve_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve().await })
        };
        assert_eq!(wait_for(&rx), Seen::Bind);

        let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let Seen::Join(id) = wait_for(&rx) else {
            panic!("expected join");
        };

        server.connections().send(id, "hello client\r\n").await.unwrap();
        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello client\r\n");

        server.shutdown();
        tokio::time::timeout(Duration::from_secs(1), serve_task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[test]
    fn decode_strips_trailing_terminators_only() {
        assert_eq!(decode_chunk(b"msg 1 hi\r\n"), "msg 1 hi");
        assert_eq!(decode_chunk(b"w\n"), "w");
        assert_eq!(decode_chunk(b"  padded  \r\n"), "  padded  ");
        // Invalid UTF-8 falls back to a lossy representation.
        assert_eq!(decode_chunk(&[0xff, 0xfe, b'a']), "\u{fffd}\u{fffd}a");
    }
}
