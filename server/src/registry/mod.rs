//! Connection Registry
//!
//! Maps each bot secret to the single WebSocket connection currently allowed
//! to receive its events. Backed by `DashMap`, so every operation runs inside
//! one shard lock and never suspends.
//!
//! Ownership rules:
//! - `put` always wins and hands back whatever it replaced.
//! - `remove_if_owner` only deletes an entry whose [`ConnectionId`] matches,
//!   so a slow-closing old connection can never unregister its successor.

pub mod handle;

use dashmap::DashMap;
use tracing::debug;

pub use handle::{
    ChannelHandle, ChannelOutbox, ConnectionId, Outbound, SendError, DEFAULT_OUTBOUND_CAPACITY,
};

use crate::util::key_fingerprint;

/// Thread-safe secret → connection map.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, ChannelHandle>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` as the owner of `key`, returning the evicted handle.
    ///
    /// The caller is responsible for closing the evicted handle; this method
    /// does not wait on it.
    pub fn put(&self, key: &str, handle: ChannelHandle) -> Option<ChannelHandle> {
        let id = handle.id();
        let evicted = self.connections.insert(key.to_owned(), handle);

        debug!(
            key = %key_fingerprint(key),
            connection_id = %id,
            evicted = ?evicted.as_ref().map(ChannelHandle::id),
            "Registered connection"
        );
        evicted
    }

    /// Current owner of `key`, if any.
    pub fn get(&self, key: &str) -> Option<ChannelHandle> {
        self.connections.get(key).map(|entry| entry.value().clone())
    }

    /// Remove `key` only if `handle` is still its registered owner.
    pub fn remove_if_owner(&self, key: &str, handle: &ChannelHandle) -> bool {
        let removed = self
            .connections
            .remove_if(key, |_, current| current.same_connection(handle))
            .is_some();

        debug!(
            key = %key_fingerprint(key),
            connection_id = %handle.id(),
            removed,
            "Owner-checked removal"
        );
        removed
    }

    /// Whether `key` currently has an owner.
    pub fn contains(&self, key: &str) -> bool {
        self.connections.contains_key(key)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ask every registered connection to close. Used on shutdown.
    ///
    /// Entries stay in place; each session unregisters itself as it ends.
    pub fn close_all(&self) -> usize {
        let handles: Vec<ChannelHandle> = self
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for handle in &handles {
            handle.close();
        }
        handles.len()
    }
}
