//! Engine Adapter
//!
//! The BitTorrent engine itself lives outside this crate and is consumed
//! through [`TorrentEngine`]. [`EngineAdapter`] converts between the
//! engine's raw types and the application's types.

use crate::scheduler::priorities_for;
use crate::types::{FileSelection, LifecycleState, TorrentIdentity, TorrentSnapshot, TorrentSource};
use crate::utils::{calculate_progress, estimate_eta};
use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Width of the listen range opened above the configured port.
pub const LISTEN_PORT_SPAN: u16 = 10;

/// Bootstrap nodes handed to the engine when DHT starts.
pub const DEFAULT_DHT_ROUTERS: &[(&str, u16)] = &[
    ("router.bittorrent.com", 6881),
    ("dht.transmissionbt.com", 6881),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("metadata not available")]
    MetadataUnavailable,
}

/// Live reference to a torrent inside the engine session.
///
/// Deliberately not `Clone`: the registry entry is the only owner.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle {
    id: u64,
    identity: TorrentIdentity,
}

impl EngineHandle {
    pub fn new(id: u64, identity: TorrentIdentity) -> Self {
        Self { id, identity }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> TorrentIdentity {
        self.identity
    }
}

/// Per-file download priority understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePriority {
    Skip = 0,
    Normal = 4,
}

/// Phase reported by the engine, before pause/error overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    QueuedForChecking,
    CheckingFiles,
    DownloadingMetadata,
    Downloading,
    Finished,
    Seeding,
    Allocating,
    CheckingResumeData,
}

/// Raw per-torrent status as the engine reports it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineStatus {
    /// `None` until metadata is known.
    pub name: Option<String>,
    pub state: EngineState,
    pub paused: bool,
    pub error: Option<String>,
    pub has_metadata: bool,
    pub num_files: Option<usize>,
    pub total_wanted: u64,
    pub total_wanted_done: u64,
    pub total_done: u64,
    pub all_time_upload: u64,
    pub download_rate: f64,
    pub upload_rate: f64,
    pub num_peers: u32,
    pub num_seeds: u32,
    pub save_path: PathBuf,
}

/// Parameters for admitting a torrent into the session
#[derive(Debug, Clone, PartialEq)]
pub struct AddTorrentParams {
    pub source: TorrentSource,
    pub save_path: PathBuf,
    /// Opaque fast-resume payload from an earlier export.
    pub resume_data: Option<Vec<u8>>,
    pub sparse_storage: bool,
}

/// Session-wide settings pushed to the engine in one update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub user_agent: String,
    pub enable_dht: bool,
    pub enable_lsd: bool,
    pub enable_upnp: bool,
    pub enable_natpmp: bool,
    pub connections_limit: u32,
    pub unchoke_slots_limit: u32,
    /// Bytes per second, 0 means unlimited.
    pub download_rate_limit: u64,
    /// Bytes per second, 0 means unlimited.
    pub upload_rate_limit: u64,
}

/// Narrow interface to the BitTorrent engine session.
///
/// Implementations must tolerate concurrent `status` calls.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    async fn listen_on(&self, ports: RangeInclusive<u16>) -> Result<(), EngineError>;

    async fn start_dht(&self, routers: &[(&str, u16)]) -> Result<(), EngineError>;

    async fn add_torrent(&self, params: AddTorrentParams) -> Result<EngineHandle, EngineError>;

    async fn remove_torrent(
        &self,
        handle: &EngineHandle,
        delete_files: bool,
    ) -> Result<(), EngineError>;

    async fn pause(&self, handle: &EngineHandle) -> Result<(), EngineError>;

    async fn resume(&self, handle: &EngineHandle) -> Result<(), EngineError>;

    async fn set_file_priorities(
        &self,
        handle: &EngineHandle,
        priorities: &[FilePriority],
    ) -> Result<(), EngineError>;

    async fn status(&self, handle: &EngineHandle) -> Result<EngineStatus, EngineError>;

    async fn export_resume_state(&self, handle: &EngineHandle) -> Result<Vec<u8>, EngineError>;

    async fn apply_settings(&self, settings: EngineSettings) -> Result<(), EngineError>;
}

/// Adapter to convert between engine types and application types
#[derive(Clone)]
pub struct EngineAdapter {
    engine: Arc<dyn TorrentEngine>,
}

impl EngineAdapter {
    /// Create a new adapter with the given engine
    pub fn new(engine: Arc<dyn TorrentEngine>) -> Self {
        Self { engine }
    }

    /// Bind the listen range starting at `port`
    pub async fn listen_on(&self, port: u16) -> Result<(), EngineError> {
        let last = port.saturating_add(LISTEN_PORT_SPAN);
        self.engine.listen_on(port..=last).await
    }

    pub async fn start_dht(&self) -> Result<(), EngineError> {
        self.engine.start_dht(DEFAULT_DHT_ROUTERS).await
    }

    /// Add a torrent from its source, optionally resuming from a blob
    pub async fn add(
        &self,
        source: TorrentSource,
        save_path: PathBuf,
        resume_data: Option<Vec<u8>>,
    ) -> Result<EngineHandle, EngineError> {
        let params = AddTorrentParams {
            source,
            save_path,
            resume_data,
            sparse_storage: true,
        };
        self.engine.add_torrent(params).await
    }

    pub async fn remove(&self, handle: &EngineHandle, delete_files: bool) -> Result<(), EngineError> {
        self.engine.remove_torrent(handle, delete_files).await
    }

    pub async fn pause(&self, handle: &EngineHandle) -> Result<(), EngineError> {
        self.engine.pause(handle).await
    }

    pub async fn resume(&self, handle: &EngineHandle) -> Result<(), EngineError> {
        self.engine.resume(handle).await
    }

    /// Query the engine and build an application snapshot
    pub async fn snapshot(&self, handle: &EngineHandle) -> Result<TorrentSnapshot, EngineError> {
        let status = self.engine.status(handle).await?;
        Ok(convert_status(handle.identity(), status))
    }

    /// Push the full priority vector for `selection` and return it
    pub async fn apply_selection(
        &self,
        handle: &EngineHandle,
        selection: &FileSelection,
        num_files: usize,
    ) -> Result<Vec<FilePriority>, EngineError> {
        let priorities = priorities_for(selection, num_files);
        self.engine.set_file_priorities(handle, &priorities).await?;
        Ok(priorities)
    }

    pub async fn export_resume_state(&self, handle: &EngineHandle) -> Result<Vec<u8>, EngineError> {
        self.engine.export_resume_state(handle).await
    }

    pub async fn apply_settings(&self, settings: EngineSettings) -> Result<(), EngineError> {
        self.engine.apply_settings(settings).await
    }
}

/// Convert a raw engine status to an application snapshot
pub fn convert_status(identity: TorrentIdentity, status: EngineStatus) -> TorrentSnapshot {
    let progress = calculate_progress(status.total_wanted_done, status.total_wanted) * 100.0;
    let remaining = status.total_wanted.saturating_sub(status.total_wanted_done);
    let eta = estimate_eta(remaining, status.download_rate);

    let state = if status.paused {
        LifecycleState::Paused
    } else if status.error.is_some() {
        LifecycleState::Error
    } else {
        match status.state {
            EngineState::QueuedForChecking => LifecycleState::Queued,
            EngineState::CheckingFiles => LifecycleState::CheckingFiles,
            EngineState::DownloadingMetadata => LifecycleState::DownloadingMetadata,
            EngineState::Downloading => LifecycleState::Downloading,
            EngineState::Finished => LifecycleState::Finished,
            EngineState::Seeding => LifecycleState::Seeding,
            EngineState::Allocating => LifecycleState::Allocating,
            EngineState::CheckingResumeData => LifecycleState::CheckingResume,
        }
    };

    let ratio = if status.total_done > 0 {
        status.all_time_upload as f64 / status.total_done as f64
    } else {
        0.0
    };

    let name = match status.name {
        Some(name) if status.has_metadata => name,
        _ => "Loading...".to_string(),
    };

    TorrentSnapshot {
        identity,
        name,
        total_size: status.total_wanted,
        downloaded: status.total_wanted_done,
        uploaded: status.all_time_upload,
        download_rate: status.download_rate,
        upload_rate: status.upload_rate,
        progress,
        eta,
        ratio,
        state,
        num_peers: status.num_peers,
        num_seeds: status.num_seeds,
        save_path: status.save_path,
        paused: status.paused,
        metadata_available: status.has_metadata,
        file_count: status.num_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IDENTITY_LEN;
    use std::time::Duration;

    fn id() -> TorrentIdentity {
        TorrentIdentity::from_bytes([7; IDENTITY_LEN])
    }

    #[test]
    fn progress_uses_wanted_bytes_only() {
        // Half the files selected, all of them on disk.
        let status = EngineStatus {
            name: Some("album".into()),
            state: EngineState::Finished,
            has_metadata: true,
            num_files: Some(4),
            total_wanted: 500,
            total_wanted_done: 500,
            total_done: 500,
            ..Default::default()
        };
        let snapshot = convert_status(id(), status);
        assert_eq!(snapshot.progress, 100.0);
        assert_eq!(snapshot.state, LifecycleState::Finished);
        assert_eq!(snapshot.eta, None);
    }

    #[test]
    fn eta_requires_rate_and_remaining_bytes() {
        let mut status = EngineStatus {
            state: EngineState::Downloading,
            total_wanted: 1000,
            total_wanted_done: 400,
            download_rate: 100.0,
            ..Default::default()
        };
        let snapshot = convert_status(id(), status.clone());
        assert_eq!(snapshot.eta, Some(Duration::from_secs(6)));
        assert_eq!(snapshot.progress, 40.0);

        status.download_rate = 0.0;
        assert_eq!(convert_status(id(), status.clone()).eta, None);

        // A trickle of bytes gives an estimate no Duration can hold.
        status.total_wanted = 1_000_000_000;
        status.total_wanted_done = 0;
        status.download_rate = 1e-12;
        assert_eq!(convert_status(id(), status).eta, None);
    }

    #[test]
    fn paused_overrides_engine_state_and_name_waits_for_metadata() {
        let status = EngineStatus {
            name: Some("ignored".into()),
            state: EngineState::Downloading,
            paused: true,
            has_metadata: false,
            ..Default::default()
        };
        let snapshot = convert_status(id(), status);
        assert_eq!(snapshot.state, LifecycleState::Paused);
        assert!(snapshot.paused);
        assert_eq!(snapshot.name, "Loading...");
        assert_eq!(snapshot.progress, 0.0);
    }

    #[test]
    fn engine_error_maps_to_error_state_and_ratio_is_guarded() {
        let status = EngineStatus {
            state: EngineState::Downloading,
            error: Some("disk full".into()),
            all_time_upload: 300,
            total_done: 0,
            ..Default::default()
        };
        let snapshot = convert_status(id(), status);
        assert_eq!(snapshot.state, LifecycleState::Error);
        assert_eq!(snapshot.ratio, 0.0);
    }
}
