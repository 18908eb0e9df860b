//! Types module - data structures for Rivulet
//!
//! These types define the data models shared by the orchestrator, the
//! resume store and the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Length in bytes of a torrent info-hash.
pub const IDENTITY_LEN: usize = 20;

/// Indices of the files a user chose to download.
pub type FileSelection = BTreeSet<usize>;

/// Engine-assigned content hash identifying a torrent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TorrentIdentity([u8; IDENTITY_LEN]);

impl TorrentIdentity {
    pub fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TorrentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TorrentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TorrentIdentity({})", self.to_hex())
    }
}

impl FromStr for TorrentIdentity {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; IDENTITY_LEN];
        hex::decode_to_slice(s.trim(), &mut bytes)
            .map_err(|e| crate::Error::InvalidInput(format!("info hash {:?}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for TorrentIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TorrentIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Coarse phase a torrent is in, as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LifecycleState {
    #[default]
    Queued,
    CheckingFiles,
    DownloadingMetadata,
    Downloading,
    Finished,
    Seeding,
    Allocating,
    CheckingResume,
    Paused,
    Error,
}

impl LifecycleState {
    /// Finished and Seeding both mean every wanted byte is on disk.
    pub fn is_done(&self) -> bool {
        matches!(self, LifecycleState::Finished | LifecycleState::Seeding)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Queued => write!(f, "Queued"),
            LifecycleState::CheckingFiles => write!(f, "Checking"),
            LifecycleState::DownloadingMetadata => write!(f, "Downloading metadata"),
            LifecycleState::Downloading => write!(f, "Downloading"),
            LifecycleState::Finished => write!(f, "Finished"),
            LifecycleState::Seeding => write!(f, "Seeding"),
            LifecycleState::Allocating => write!(f, "Allocating"),
            LifecycleState::CheckingResume => write!(f, "Checking resume data"),
            LifecycleState::Paused => write!(f, "Paused"),
            LifecycleState::Error => write!(f, "Error"),
        }
    }
}

/// Observable state of one torrent at a poll instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentSnapshot {
    pub identity: TorrentIdentity,
    pub name: String,
    /// Bytes of the selected files only.
    pub total_size: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    /// Bytes per second.
    pub download_rate: f64,
    /// Bytes per second.
    pub upload_rate: f64,
    /// Percentage of wanted bytes on disk, 0 to 100.
    pub progress: f64,
    /// `None` when no finite estimate exists.
    pub eta: Option<Duration>,
    pub ratio: f64,
    pub state: LifecycleState,
    pub num_peers: u32,
    pub num_seeds: u32,
    pub save_path: PathBuf,
    pub paused: bool,
    pub metadata_available: bool,
    pub file_count: Option<usize>,
}

impl TorrentSnapshot {
    /// Snapshot used when the engine could not be queried right after an add.
    pub fn unavailable(identity: TorrentIdentity, save_path: PathBuf) -> Self {
        Self {
            identity,
            name: "Error".to_string(),
            total_size: 0,
            downloaded: 0,
            uploaded: 0,
            download_rate: 0.0,
            upload_rate: 0.0,
            progress: 0.0,
            eta: None,
            ratio: 0.0,
            state: LifecycleState::Error,
            num_peers: 0,
            num_seeds: 0,
            save_path,
            paused: false,
            metadata_available: false,
            file_count: None,
        }
    }

    pub fn remaining(&self) -> u64 {
        self.total_size.saturating_sub(self.downloaded)
    }
}

/// Where a torrent's metadata originally came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentSource {
    File(PathBuf),
    Magnet(String),
}

impl fmt::Display for TorrentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TorrentSource::File(path) => write!(f, "{}", path.display()),
            TorrentSource::Magnet(uri) => write!(f, "{}", uri),
        }
    }
}

/// Durable part of a registry entry, written to the session manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTorrentRecord {
    pub identity: TorrentIdentity,
    #[serde(default)]
    pub name: String,
    pub save_path: PathBuf,
    pub source: TorrentSource,
    pub added_at: DateTime<Utc>,
    /// Set once the completion notification has fired.
    #[serde(default)]
    pub completed: bool,
    /// Selection still waiting for metadata at the time of the save.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_selection: Option<FileSelection>,
}

impl PersistedTorrentRecord {
    pub fn new(identity: TorrentIdentity, save_path: PathBuf, source: TorrentSource) -> Self {
        Self {
            identity,
            name: String::new(),
            save_path,
            source,
            added_at: Utc::now(),
            completed: false,
            pending_selection: None,
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub download_path: String,
    pub listen_port: u16,
    pub enable_dht: bool,
    pub enable_lsd: bool,
    /// Covers both UPnP and NAT-PMP port mapping.
    pub enable_upnp: bool,
    pub max_connections: u32,
    pub max_uploads: u32,
    pub limit_download: bool,
    /// KiB/s, only honoured while `limit_download` is set.
    pub download_limit: u64,
    pub limit_upload: bool,
    /// KiB/s, only honoured while `limit_upload` is set.
    pub upload_limit: u64,
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        let download_path = dirs::download_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join("Downloads"))
            .join("Rivulet")
            .to_string_lossy()
            .to_string();

        Self {
            download_path,
            listen_port: 6881,
            enable_dht: true,
            enable_lsd: true,
            enable_upnp: true,
            max_connections: 200,
            max_uploads: 4,
            limit_download: false,
            download_limit: 1000,
            limit_upload: false,
            upload_limit: 100,
            user_agent: format!("Rivulet/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}
