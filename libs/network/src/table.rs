//! Shared connection table.
//!
//! The table owns the outbound half of every live connection and hands out
//! [`ConnectionId`] tokens. Collaborators outside this crate (the contact
//! registry, the delivery path) hold only the token, never the socket, so
//! connection lifetime stays under the event loop's control.

use crate::error::{NetworkError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

/// Opaque token identifying one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound half of a connection, stream or datagram.
#[derive(Clone)]
pub(crate) enum Outbound {
    Stream(Arc<Mutex<OwnedWriteHalf>>),
    Datagram {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
    },
}

pub(crate) struct Entry {
    pub peer_addr: SocketAddr,
    pub outbound: Outbound,
}

/// Cheaply cloneable map from [`ConnectionId`] to peer address and outbound
/// handle. Writes go through [`ConnectionTable::send`], which submits the full
/// text (partial stream writes are retried by `write_all`).
#[derive(Clone)]
pub struct ConnectionTable {
    entries: Arc<RwLock<HashMap<ConnectionId, Entry>>>,
    next_id: Arc<AtomicU64>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub(crate) fn register(&self, peer_addr: SocketAddr, outbound: Outbound) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().insert(id, Entry { peer_addr, outbound });
        id
    }

    pub(crate) fn deregister(&self, id: ConnectionId) -> Option<Entry> {
        self.entries.write().remove(&id)
    }

    pub(crate) fn ids(&self) -> Vec<ConnectionId> {
        self.entries.read().keys().copied().collect()
    }

    pub fn peer_addr(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.entries.read().get(&id).map(|e| e.peer_addr)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Write `text` in full to the given connection, or fail with a
    /// connection error. Unknown ids fail the same way: the connection is
    /// gone as far as callers are concerned.
    pub async fn send(&self, id: ConnectionId, text: &str) -> Result<()> {
        let (peer_addr, outbound) = {
            let entries = self.entries.read();
            let entry = entries
                .get(&id)
                .ok_or_else(|| NetworkError::connection(format!("unknown connection {id}"), None))?;
            (entry.peer_addr, entry.outbound.clone())
        };

        match outbound {
            Outbound::Stream(writer) => {
                let mut writer = writer.lock().await;
                writer.write_all(text.as_bytes()).await.map_err(|e| {
                    NetworkError::connection_with_source(
                        format!("write to {id} failed"),
                        Some(peer_addr),
                        e,
                    )
                })?;
            }
            Outbound::Datagram { socket, peer } => {
                socket.send_to(text.as_bytes(), peer).await.map_err(|e| {
                    NetworkError::connection_with_source(
                        format!("send_to {id} failed"),
                        Some(peer),
                        e,
                    )
                })?;
            }
        }
        Ok(())
    }

    /// Unregister and close one connection. Returns the peer address when an
    /// entry was actually removed, so the caller fires the disconnect event
    /// exactly once even if close races with the reader's own cleanup.
    pub(crate) async fn close(&self, id: ConnectionId) -> Result<Option<SocketAddr>> {
        let Some(entry) = self.deregister(id) else {
            return Ok(None);
        };
        if let Outbound::Stream(writer) = entry.outbound {
            let mut writer = writer.lock().await;
            writer.shutdown().await.map_err(|e| {
                NetworkError::close_connection(format!("failed to close {id}"), e)
            })?;
        }
        Ok(Some(entry.peer_addr))
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}
