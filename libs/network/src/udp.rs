//! UDP server driver.
//!
//! Shares the handler table and connection table with the TCP driver, but
//! connections are pseudo-connections keyed by peer address. The first
//! datagram from an unknown peer is a registration handshake and fires
//! `join`; every later datagram fires `message`. This avoids racing a peer's
//! first command against its asynchronous registration.
//!
//! Datagrams carry no close signal, so pseudo-connections live until
//! shutdown or an explicit `close_connection`: a silent peer is never
//! expired, and its identity is not recycled. Stream transports do not
//! share this limitation (a zero-byte read closes them).

use crate::error::{NetworkError, Result};
use crate::event::EventHandlers;
use crate::table::{ConnectionId, ConnectionTable, Outbound};
use crate::tcp::decode_chunk;
use crate::{validate_port, Server, READ_BUFFER_SIZE};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct UdpServer {
    host: String,
    port: u16,
    handlers: Arc<EventHandlers>,
    table: ConnectionTable,
    peers: Arc<Mutex<HashMap<SocketAddr, ConnectionId>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl UdpServer {
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
            peers: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn bind_socket(&self) -> Result<UdpSocket> {
        UdpSocket::bind(self.endpoint()).await.map_err(|e| match e.kind() {
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

    fn handle_datagram(&self, socket: &Arc<UdpSocket>, peer: SocketAddr, chunk: &[u8]) {
        let known = self.peers.lock().get(&peer).copied();
        match known {
            None => {
                let id = self.table.register(
                    peer,
                    Outbound::Datagram {
                        socket: Arc::clone(socket),
                        peer,
                    },
                );
                self.peers.lock().insert(peer, id);
                info!(connection = %id, peer = %peer, "datagram peer joined");
                (self.handlers.on_join)(id, peer);
            }
            Some(id) => {
                (self.handlers.on_message)(id, decode_chunk(chunk));
            }
        }
    }

    async fn close_all(&self) {
        self.peers.lock().clear();
        for id in self.table.ids() {
            match self.table.close(id).await {
                Ok(Some(_)) => (self.handlers.on_disconnect)(id),
                Ok(None) => {}
                Err(e) => {
                    warn!(connection = %id, error = %e, "close during shutdown failed");
                    (self.handlers.on_disconnect)(id);
                }
            }
        }
    }
}

#[async_trait]
impl Server for UdpServer {
    async fn serve(&self) -> Result<()> {
        let socket = Arc::new(self.bind_socket().await?);
        let local_addr = socket
            .local_addr()
            .map_err(|e| NetworkError::bind("failed to resolve bound address", e))?;

        info!(addr = %local_addr, "listening (datagram)");
        (self.handlers.on_bind)(local_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((n, peer)) => self.handle_datagram(&socket, peer, &buf[..n]),
                    Err(e) => warn!(error = %e, "recv_from failed"),
                },
            }
        }

        debug!("shutdown observed, releasing datagram peers");
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
        if let Some(peer) = self.table.close(id).await? {
            self.peers.lock().remove(&peer);
            (self.handlers.on_disconnect)(id);
        }
        Ok(())
    }
}
