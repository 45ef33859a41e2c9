//! Contact registry: the shared book of connected clients.
//!
//! Hands out small positive identities and recycles them after release,
//! preferring the most recently released value over a fresh counter value.
//! This is the only state mutated from more than one task; every operation
//! takes the one internal lock, so allocate-and-insert is atomic and the
//! operations are linearizable with respect to each other.

use chat_network::ConnectionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;

/// Positive integer identity, unique among currently connected clients.
pub type ClientId = u32;

#[derive(Debug, Error)]
pub enum ContactError {
    /// The allocator chose an identity already bound to a different
    /// connection. Unreachable in correct operation; observing it means a
    /// concurrency bug.
    #[error("contact book conflict: client {id} is already registered to a different connection")]
    Conflict { id: ClientId },

    /// Reverse lookup found no client for the connection. Fatal for the
    /// request that needed it, not for the process.
    #[error("no client registered for {connection}")]
    UnknownConnection { connection: ConnectionId },
}

/// Peer address plus the non-owning connection token. The registry never
/// closes the connection behind the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactEntry {
    pub peer_addr: SocketAddr,
    pub connection: ConnectionId,
}

#[derive(Default)]
struct Book {
    entries: HashMap<ClientId, ContactEntry>,
    /// Released identities, reused LIFO before the counter advances.
    released: Vec<ClientId>,
    /// Highest identity ever issued.
    last_issued: ClientId,
}

pub struct ContactRegistry {
    book: Mutex<Book>,
}

impl ContactRegistry {
    pub fn new() -> Self {
        Self {
            book: Mutex::new(Book::default()),
        }
    }

    /// Allocate an identity and insert the entry atomically. Registering a
    /// pair that is already present returns its existing identity.
    pub fn add(
        &self,
        peer_addr: SocketAddr,
        connection: ConnectionId,
    ) -> Result<ClientId, ContactError> {
        let entry = ContactEntry {
            peer_addr,
            connection,
        };
        let mut book = self.book.lock();

        if let Some((id, _)) = book.entries.iter().find(|(_, e)| **e == entry) {
            return Ok(*id);
        }

        let id = match book.released.pop() {
            Some(reused) => reused,
            None => {
                book.last_issued += 1;
                book.last_issued
            }
        };
        if book.entries.contains_key(&id) {
            book.released.push(id);
            return Err(ContactError::Conflict { id });
        }
        book.entries.insert(id, entry);
        Ok(id)
    }

    /// Delete the entry if present and return the identity to the reuse
    /// pool. Returns whether a removal occurred.
    pub fn remove(&self, id: ClientId) -> bool {
        let mut book = self.book.lock();
        if book.entries.remove(&id).is_some() {
            book.released.push(id);
            true
        } else {
            false
        }
    }

    /// Sorted snapshot of currently registered identities.
    pub fn list(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.book.lock().entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn get(&self, id: ClientId) -> Option<ContactEntry> {
        self.book.lock().entries.get(&id).copied()
    }

    /// Reverse lookup from connection token to identity.
    pub fn resolve(&self, connection: ConnectionId) -> Result<ClientId, ContactError> {
        self.book
            .lock()
            .entries
            .iter()
            .find(|(_, e)| e.connection == connection)
            .map(|(id, _)| *id)
            .ok_or(ContactError::UnknownConnection { connection })
    }
}

impl Default for ContactRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn conn(raw: u64) -> ConnectionId {
        ConnectionId::from_raw(raw)
    }

    #[test]
    fn identities_start_at_one_and_increase() {
        let registry = ContactRegistry::new();
        assert_eq!(registry.add(addr(4000), conn(1)).unwrap(), 1);
        assert_eq!(registry.add(addr(4001), conn(2)).unwrap(), 2);
        assert_eq!(registry.add(addr(4002), conn(3)).unwrap(), 3);
        assert_eq!(registry.list(), vec![1, 2, 3]);
    }

    #[test]
    fn no_duplicates_at_any_point() {
        let registry = ContactRegistry::new();
        for i in 0..20u64 {
            registry.add(addr(4000 + i as u16), conn(i)).unwrap();
            if i % 3 == 0 {
                registry.remove((i / 3 + 1) as ClientId);
            }
            let ids = registry.list();
            let mut deduped = ids.clone();
            deduped.dedup();
            assert_eq!(ids, deduped);
        }
    }

    #[test]
    fn released_identity_is_reused_before_the_counter() {
        let registry = ContactRegistry::new();
        registry.add(addr(4000), conn(1)).unwrap();
        registry.add(addr(4001), conn(2)).unwrap();
        registry.add(addr(4002), conn(3)).unwrap();

        assert!(registry.remove(1));
        assert_eq!(registry.add(addr(4003), conn(4)).unwrap(), 1);
    }

    #[test]
    fn reuse_is_lifo_of_release_then_counter_resumes() {
        let registry = ContactRegistry::new();
        registry.add(addr(4000), conn(1)).unwrap();
        registry.add(addr(4001), conn(2)).unwrap();
        registry.add(addr(4002), conn(3)).unwrap();

        assert!(registry.remove(1));
        assert!(registry.remove(2));

        // Most recently released first.
        assert_eq!(registry.add(addr(4003), conn(4)).unwrap(), 2);
        assert_eq!(registry.add(addr(4004), conn(5)).unwrap(), 1);
        // 3 is still held, so the counter resumes at 4.
        assert_eq!(registry.add(addr(4005), conn(6)).unwrap(), 4);
        assert_eq!(registry.list(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn add_is_idempotent_for_an_identical_pair() {
        let registry = ContactRegistry::new();
        let first = registry.add(addr(4000), conn(7)).unwrap();
        let second = registry.add(addr(4000), conn(7)).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.list(), vec![first]);
    }

    #[test]
    fn remove_of_unknown_identity_reports_false() {
        let registry = ContactRegistry::new();
        assert!(!registry.remove(42));
        registry.add(addr(4000), conn(1)).unwrap();
        assert!(registry.remove(1));
        assert!(!registry.remove(1));
    }

    #[test]
    fn resolve_finds_the_identity_behind_a_connection() {
        let registry = ContactRegistry::new();
        registry.add(addr(4000), conn(10)).unwrap();
        let id = registry.add(addr(4001), conn(11)).unwrap();

        assert_eq!(registry.resolve(conn(11)).unwrap(), id);
        assert!(matches!(
            registry.resolve(conn(99)),
            Err(ContactError::UnknownConnection { .. })
        ));
    }

    #[test]
    fn get_returns_the_stored_entry() {
        let registry = ContactRegistry::new();
        let id = registry.add(addr(4000), conn(5)).unwrap();
        let entry = registry.get(id).unwrap();
        assert_eq!(entry.peer_addr, addr(4000));
        assert_eq!(entry.connection, conn(5));
        assert!(registry.get(id + 1).is_none());
    }
}
