//! File priority scheduling
//!
//! A magnet link has no file list until the engine fetches its metadata, so a
//! selection made at add time is parked here and consumed by the first poll
//! tick that sees metadata.

use crate::engine_adapter::FilePriority;
use crate::types::{FileSelection, TorrentIdentity};
use std::collections::HashMap;

/// Pending selections keyed by torrent
#[derive(Debug, Default)]
pub struct PrioritySchedule {
    pending: HashMap<TorrentIdentity, FileSelection>,
}

impl PrioritySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a selection; replaces any earlier one for the same torrent.
    pub fn request(&mut self, identity: TorrentIdentity, selection: FileSelection) {
        self.pending.insert(identity, selection);
    }

    pub fn pending(&self, identity: &TorrentIdentity) -> Option<&FileSelection> {
        self.pending.get(identity)
    }

    pub fn has_pending(&self, identity: &TorrentIdentity) -> bool {
        self.pending.contains_key(identity)
    }

    /// Remove and return the selection for `identity`.
    pub fn take(&mut self, identity: &TorrentIdentity) -> Option<FileSelection> {
        self.pending.remove(identity)
    }

    pub fn cancel(&mut self, identity: &TorrentIdentity) {
        self.pending.remove(identity);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Full priority vector for a torrent with `num_files` files.
///
/// Selected indices download normally, everything else is skipped.
pub fn priorities_for(selection: &FileSelection, num_files: usize) -> Vec<FilePriority> {
    if let Some(max) = selection.iter().next_back().filter(|&&i| i >= num_files) {
        log::warn!(
            "Ignoring file selection beyond torrent file count ({} >= {})",
            max,
            num_files
        );
    }

    (0..num_files)
        .map(|index| {
            if selection.contains(&index) {
                FilePriority::Normal
            } else {
                FilePriority::Skip
            }
        })
        .collect()
}
