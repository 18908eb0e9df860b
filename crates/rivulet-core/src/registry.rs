//! Torrent registry - the in-memory source of truth for live torrents

use crate::engine_adapter::EngineHandle;
use crate::error::{Error, Result};
use crate::types::{PersistedTorrentRecord, TorrentIdentity, TorrentSnapshot};
use std::collections::HashMap;

/// One live torrent: its engine handle, durable record and cached snapshot
#[derive(Debug)]
pub struct RegistryEntry {
    pub handle: EngineHandle,
    pub record: PersistedTorrentRecord,
    pub snapshot: TorrentSnapshot,
}

impl RegistryEntry {
    pub fn identity(&self) -> TorrentIdentity {
        self.record.identity
    }
}

/// Torrents currently in the session, in the order they were added
#[derive(Debug, Default)]
pub struct TorrentRegistry {
    entries: HashMap<TorrentIdentity, RegistryEntry>,
    order: Vec<TorrentIdentity>,
}

impl TorrentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly added torrent.
    pub fn insert(
        &mut self,
        handle: EngineHandle,
        record: PersistedTorrentRecord,
        snapshot: TorrentSnapshot,
    ) -> Result<()> {
        let identity = record.identity;
        if self.entries.contains_key(&identity) {
            return Err(Error::AlreadyExists(identity.to_string()));
        }

        self.order.push(identity);
        self.entries.insert(
            identity,
            RegistryEntry {
                handle,
                record,
                snapshot,
            },
        );
        Ok(())
    }

    /// Drop a torrent and hand back its entry so the caller owns the handle.
    pub fn remove(&mut self, identity: &TorrentIdentity) -> Result<RegistryEntry> {
        let entry = self
            .entries
            .remove(identity)
            .ok_or_else(|| Error::NotFound(identity.to_string()))?;
        self.order.retain(|id| id != identity);
        Ok(entry)
    }

    pub fn contains(&self, identity: &TorrentIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn get(&self, identity: &TorrentIdentity) -> Option<&TorrentSnapshot> {
        self.entries.get(identity).map(|entry| &entry.snapshot)
    }

    pub fn entry(&self, identity: &TorrentIdentity) -> Option<&RegistryEntry> {
        self.entries.get(identity)
    }

    pub fn entry_mut(&mut self, identity: &TorrentIdentity) -> Option<&mut RegistryEntry> {
        self.entries.get_mut(identity)
    }

    pub fn handle(&self, identity: &TorrentIdentity) -> Option<&EngineHandle> {
        self.entries.get(identity).map(|entry| &entry.handle)
    }

    /// Replace the cached snapshot, returning the previous one.
    pub fn update_snapshot(&mut self, snapshot: TorrentSnapshot) -> Option<TorrentSnapshot> {
        let entry = self.entries.get_mut(&snapshot.identity)?;
        if snapshot.metadata_available && entry.record.name != snapshot.name {
            entry.record.name = snapshot.name.clone();
        }
        Some(std::mem::replace(&mut entry.snapshot, snapshot))
    }

    /// Snapshot of every torrent, keyed by identity
    pub fn all(&self) -> HashMap<TorrentIdentity, TorrentSnapshot> {
        self.entries
            .iter()
            .map(|(id, entry)| (*id, entry.snapshot.clone()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn identities(&self) -> Vec<TorrentIdentity> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
