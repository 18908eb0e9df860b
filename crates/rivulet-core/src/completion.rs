//! At-most-once completion detection

use crate::types::{TorrentIdentity, TorrentSnapshot};
use std::collections::HashSet;

/// Remembers which torrents already reported completion
#[derive(Debug, Default)]
pub struct CompletionTracker {
    completed: HashSet<TorrentIdentity>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `snapshot` shows a finished torrent.
    pub fn observe(&mut self, snapshot: &TorrentSnapshot) -> bool {
        if !snapshot.state.is_done() || snapshot.progress < 100.0 {
            return false;
        }
        self.completed.insert(snapshot.identity)
    }

    /// Mark a torrent as already reported, e.g. when restored from disk.
    pub fn mark(&mut self, identity: TorrentIdentity) {
        self.completed.insert(identity);
    }

    pub fn is_completed(&self, identity: &TorrentIdentity) -> bool {
        self.completed.contains(identity)
    }

    /// Make a removed torrent eligible again if it is re-added.
    pub fn forget(&mut self, identity: &TorrentIdentity) {
        self.completed.remove(identity);
    }

    pub fn clear(&mut self) {
        self.completed.clear();
    }
}
