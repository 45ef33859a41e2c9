//! Connection event layer.
//!
//! Multiplexes many peer connections behind a closed table of lifecycle
//! events (bind, connect, join, message, disconnect). Two operating modes
//! share one design: a server binds and accepts many peers, a client
//! connects to one endpoint; both decode bounded chunks, strip trailing
//! line terminators, and dispatch through [`EventHandlers`].
//!
//! Ownership rule: sockets live in the [`ConnectionTable`]; everything
//! outside this crate refers to them only through [`ConnectionId`] tokens
//! and never closes them directly.

pub mod client;
pub mod error;
pub mod event;
pub mod table;
pub mod tcp;
pub mod udp;

pub use client::SocketClient;
pub use error::{NetworkError, Result};
pub use event::{EventHandlers, EventHandlersBuilder};
pub use table::{ConnectionId, ConnectionTable};
pub use tcp::TcpServer;
pub use udp::UdpServer;

use async_trait::async_trait;
use std::str::FromStr;

/// Bounded size of one read; the protocol above is line-oriented, so no
/// reassembly happens at this layer.
pub(crate) const READ_BUFFER_SIZE: usize = 1024;

/// Stream or datagram transport, selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

impl FromStr for TransportProtocol {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TCP" => Ok(Self::Tcp),
            "UDP" => Ok(Self::Udp),
            other => Err(NetworkError::configuration(
                format!("unknown transport protocol '{other}'"),
                Some("CONNECTION_PROTOCOL"),
            )),
        }
    }
}

/// Server-mode driver surface consumed by the composition root.
#[async_trait]
pub trait Server: Send + Sync {
    /// Bind and run the event loop until shutdown is requested. Startup
    /// failures (availability, permission, bind) surface here.
    async fn serve(&self) -> Result<()>;

    /// Shared connection table for outbound writes.
    fn connections(&self) -> ConnectionTable;

    /// Flip the shutdown flag; `serve` exits within one poll of observing it.
    fn shutdown(&self);

    /// Unregister and close one connection, firing `disconnect`.
    async fn close_connection(&self, id: ConnectionId) -> Result<()>;
}

/// Ports are 1-65535; zero is the only value a `u16` can hold that is
/// outside the valid range.
pub(crate) fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(NetworkError::configuration(
            "port is not in the valid range 1-65535",
            Some("port"),
        ));
    }
    Ok(())
}
