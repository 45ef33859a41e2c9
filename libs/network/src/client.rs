//! Client-mode driver.
//!
//! Same mechanism as the server with a fan-out of one: connect to a single
//! endpoint, fire `connect`, then read bounded chunks on that connection
//! until the peer closes or shutdown is requested. TCP and UDP share the
//! struct; the transport is selected at construction.

use crate::error::{NetworkError, Result};
use crate::event::EventHandlers;
use crate::table::{ConnectionId, ConnectionTable, Outbound};
use crate::tcp::decode_chunk;
use crate::{validate_port, TransportProtocol, READ_BUFFER_SIZE};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct SocketClient {
    host: String,
    port: u16,
    protocol: TransportProtocol,
    handlers: Arc<EventHandlers>,
    table: ConnectionTable,
    connection: Arc<Mutex<Option<ConnectionId>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SocketClient {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        protocol: TransportProtocol,
        handlers: EventHandlers,
    ) -> Result<Self> {
        validate_port(port)?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            host: host.into(),
            port,
            protocol,
            handlers: Arc::new(handlers),
            table: ConnectionTable::new(),
            connection: Arc::new(Mutex::new(None)),
            shutdown_tx,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect and run the read loop until shutdown or peer close.
    pub async fn run(&self) -> Result<()> {
        match self.protocol {
            TransportProtocol::Tcp => self.run_tcp().await,
            TransportProtocol::Udp => self.run_udp().await,
        }
    }

    /// Write the full text to the server connection.
    pub async fn send(&self, text: &str) -> Result<()> {
        let id = (*self.connection.lock())
            .ok_or_else(|| NetworkError::connection("not connected", None))?;
        self.table.send(id, text).await
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn run_tcp(&self) -> Result<()> {
        let stream = TcpStream::connect(self.endpoint()).await.map_err(|e| match e.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::TimedOut | ErrorKind::HostUnreachable => {
                NetworkError::availability(self.endpoint(), "peer is not reachable")
            }
            _ => NetworkError::connect(format!("failed to connect to {}", self.endpoint()), e),
        })?;
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| NetworkError::connect("failed to resolve peer address", e))?;

        let (mut read_half, write_half) = stream.into_split();
        let id = self
            .table
            .register(peer_addr, Outbound::Stream(Arc::new(tokio::sync::Mutex::new(write_half))));
        *self.connection.lock() = Some(id);

        info!(connection = %id, peer = %peer_addr, "connected");
        (self.handlers.on_connect)(id);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                read = read_half.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!(connection = %id, "server closed the connection");
                        break;
                    }
                    Ok(n) => (self.handlers.on_message)(id, decode_chunk(&buf[..n])),
                    Err(e) => {
                        warn!(connection = %id, error = %e, "read failed");
                        break;
                    }
                },
            }
        }
        self.close(id).await
    }

    async fn run_udp(&self) -> Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| NetworkError::connect("failed to bind local datagram socket", e))?;
        socket
            .connect(self.endpoint())
            .await
            .map_err(|e| NetworkError::availability(self.endpoint(), e.to_string()))?;
        let peer_addr = socket
            .peer_addr()
            .map_err(|e| NetworkError::connect("failed to resolve peer address", e))?;

        let socket = Arc::new(socket);
        let id = self.table.register(
            peer_addr,
            Outbound::Datagram {
                socket: Arc::clone(&socket),
                peer: peer_addr,
            },
        );
        *self.connection.lock() = Some(id);

        info!(connection = %id, peer = %peer_addr, "connected (datagram)");
        (self.handlers.on_connect)(id);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                received = socket.recv(&mut buf) => match received {
                    Ok(n) => (self.handlers.on_message)(id, decode_chunk(&buf[..n])),
                    Err(e) => {
                        warn!(connection = %id, error = %e, "recv failed");
                        break;
                    }
                },
            }
        }
        self.close(id).await
    }

    async fn close(&self, id: ConnectionId) -> Result<()> {
        *self.connection.lock() = None;
        if self.table.close(id).await?.is_some() {
            (self.handlers.on_disconnect)(id);
        }
        Ok(())
    }
}
