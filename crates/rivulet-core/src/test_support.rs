//! Scripted engine used by the unit tests.

use crate::engine_adapter::{
    AddTorrentParams, EngineError, EngineHandle, EngineSettings, EngineState, EngineStatus,
    FilePriority, TorrentEngine,
};
use crate::types::{TorrentIdentity, TorrentSource, IDENTITY_LEN};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::{Mutex, MutexGuard};

pub fn identity(byte: u8) -> TorrentIdentity {
    TorrentIdentity::from_bytes([byte; IDENTITY_LEN])
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// What the engine "knows" about a source before it is added
#[derive(Debug, Clone)]
struct Catalog {
    identity: TorrentIdentity,
    name: String,
    num_files: usize,
    metadata: bool,
}

#[derive(Debug)]
struct MockTorrent {
    identity: TorrentIdentity,
    name: String,
    num_files: usize,
    status: EngineStatus,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    catalog: HashMap<String, Catalog>,
    torrents: HashMap<u64, MockTorrent>,
    added: Vec<AddTorrentParams>,
    removed: Vec<(TorrentIdentity, bool)>,
    priority_calls: Vec<(TorrentIdentity, Vec<FilePriority>)>,
    settings: Vec<EngineSettings>,
    listen_calls: Vec<RangeInclusive<u16>>,
    paused: Vec<TorrentIdentity>,
    dht_started: bool,
    failing_exports: HashSet<TorrentIdentity>,
    failing_status: HashMap<TorrentIdentity, EngineError>,
    reject_adds: bool,
    reject_settings: bool,
}

/// In-memory stand-in for the BitTorrent engine
#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `source` resolvable; magnets start without metadata.
    ///
    /// Files are recognised by content, so copies of a registered file resolve
    /// to the same torrent.
    pub fn register(&self, source: &TorrentSource, identity: TorrentIdentity, num_files: usize) {
        let metadata = matches!(source, TorrentSource::File(_));
        self.state().catalog.insert(
            catalog_key(source),
            Catalog {
                identity,
                name: format!("torrent-{}", &identity.to_hex()[..8]),
                num_files,
                metadata,
            },
        );
    }

    fn with_torrent<R>(&self, identity: &TorrentIdentity, f: impl FnOnce(&mut MockTorrent) -> R) -> Option<R> {
        let mut state = self.state();
        let result = state
            .torrents
            .values_mut()
            .find(|t| t.identity == *identity)
            .map(f);
        result
    }

    /// Simulate metadata arriving for a magnet download.
    pub fn reveal_metadata(&self, identity: &TorrentIdentity) {
        self.with_torrent(identity, |t| {
            t.status.has_metadata = true;
            t.status.num_files = Some(t.num_files);
            t.status.name = Some(t.name.clone());
            t.status.state = EngineState::Downloading;
        });
    }

    pub fn set_progress(&self, identity: &TorrentIdentity, wanted: u64, done: u64, state: EngineState) {
        self.with_torrent(identity, |t| {
            t.status.total_wanted = wanted;
            t.status.total_wanted_done = done;
            t.status.total_done = done;
            t.status.state = state;
        });
    }

    pub fn set_rates(&self, identity: &TorrentIdentity, download: f64, upload: f64) {
        self.with_torrent(identity, |t| {
            t.status.download_rate = download;
            t.status.upload_rate = upload;
        });
    }

    pub fn set_peers(&self, identity: &TorrentIdentity, peers: u32) {
        self.with_torrent(identity, |t| t.status.num_peers = peers);
    }

    /// Drop the torrent behind the orchestrator's back.
    pub fn invalidate(&self, identity: &TorrentIdentity) {
        self.state().torrents.retain(|_, t| t.identity != *identity);
    }

    pub fn fail_export(&self, identity: TorrentIdentity) {
        self.state().failing_exports.insert(identity);
    }

    pub fn fail_status(&self, identity: TorrentIdentity, error: EngineError) {
        self.state().failing_status.insert(identity, error);
    }

    pub fn reject_adds(&self, reject: bool) {
        self.state().reject_adds = reject;
    }

    pub fn reject_settings(&self, reject: bool) {
        self.state().reject_settings = reject;
    }

    pub fn added(&self) -> Vec<AddTorrentParams> {
        self.state().added.clone()
    }

    pub fn removed(&self) -> Vec<(TorrentIdentity, bool)> {
        self.state().removed.clone()
    }

    pub fn priority_calls(&self) -> Vec<(TorrentIdentity, Vec<FilePriority>)> {
        self.state().priority_calls.clone()
    }

    pub fn applied_settings(&self) -> Vec<EngineSettings> {
        self.state().settings.clone()
    }

    pub fn listen_calls(&self) -> Vec<RangeInclusive<u16>> {
        self.state().listen_calls.clone()
    }

    pub fn paused(&self) -> Vec<TorrentIdentity> {
        self.state().paused.clone()
    }

    pub fn dht_started(&self) -> bool {
        self.state().dht_started
    }
}

fn catalog_key(source: &TorrentSource) -> String {
    match source {
        TorrentSource::File(path) => {
            let contents = std::fs::read(path).unwrap_or_default();
            format!("file:{}", String::from_utf8_lossy(&contents))
        }
        TorrentSource::Magnet(uri) => uri.clone(),
    }
}

fn lookup<'a>(state: &'a mut MockState, handle: &EngineHandle) -> Result<&'a mut MockTorrent, EngineError> {
    state
        .torrents
        .get_mut(&handle.id())
        .ok_or_else(|| EngineError::InvalidHandle(handle.identity().to_string()))
}

#[async_trait]
impl TorrentEngine for MockEngine {
    async fn listen_on(&self, ports: RangeInclusive<u16>) -> Result<(), EngineError> {
        self.state().listen_calls.push(ports);
        Ok(())
    }

    async fn start_dht(&self, routers: &[(&str, u16)]) -> Result<(), EngineError> {
        assert!(!routers.is_empty());
        self.state().dht_started = true;
        Ok(())
    }

    async fn add_torrent(&self, params: AddTorrentParams) -> Result<EngineHandle, EngineError> {
        let mut state = self.state();
        if state.reject_adds {
            return Err(EngineError::Rejected("session refused torrent".into()));
        }
        let entry = state
            .catalog
            .get(&catalog_key(&params.source))
            .cloned()
            .ok_or_else(|| EngineError::Rejected(format!("unknown source {}", params.source)))?;

        // Resume data carries metadata for magnets that already fetched it.
        let metadata = entry.metadata || params.resume_data.is_some();
        state.next_id += 1;
        let id = state.next_id;
        let status = EngineStatus {
            name: metadata.then(|| entry.name.clone()),
            state: if metadata {
                EngineState::Downloading
            } else {
                EngineState::DownloadingMetadata
            },
            has_metadata: metadata,
            num_files: metadata.then_some(entry.num_files),
            save_path: params.save_path.clone(),
            ..Default::default()
        };
        state.torrents.insert(
            id,
            MockTorrent {
                identity: entry.identity,
                name: entry.name,
                num_files: entry.num_files,
                status,
            },
        );
        state.added.push(params);
        Ok(EngineHandle::new(id, entry.identity))
    }

    async fn remove_torrent(&self, handle: &EngineHandle, delete_files: bool) -> Result<(), EngineError> {
        let mut state = self.state();
        lookup(&mut state, handle)?;
        state.torrents.remove(&handle.id());
        state.removed.push((handle.identity(), delete_files));
        Ok(())
    }

    async fn pause(&self, handle: &EngineHandle) -> Result<(), EngineError> {
        let mut state = self.state();
        lookup(&mut state, handle)?.status.paused = true;
        state.paused.push(handle.identity());
        Ok(())
    }

    async fn resume(&self, handle: &EngineHandle) -> Result<(), EngineError> {
        let mut state = self.state();
        lookup(&mut state, handle)?.status.paused = false;
        Ok(())
    }

    async fn set_file_priorities(
        &self,
        handle: &EngineHandle,
        priorities: &[FilePriority],
    ) -> Result<(), EngineError> {
        let mut state = self.state();
        let torrent = lookup(&mut state, handle)?;
        if !torrent.status.has_metadata {
            return Err(EngineError::MetadataUnavailable);
        }
        state
            .priority_calls
            .push((handle.identity(), priorities.to_vec()));
        Ok(())
    }

    async fn status(&self, handle: &EngineHandle) -> Result<EngineStatus, EngineError> {
        let mut state = self.state();
        if let Some(error) = state.failing_status.get(&handle.identity()) {
            return Err(error.clone());
        }
        Ok(lookup(&mut state, handle)?.status.clone())
    }

    async fn export_resume_state(&self, handle: &EngineHandle) -> Result<Vec<u8>, EngineError> {
        let mut state = self.state();
        if state.failing_exports.contains(&handle.identity()) {
            return Err(EngineError::Rejected("resume export failed".into()));
        }
        let torrent = lookup(&mut state, handle)?;
        Ok(format!("resume:{}:{}", torrent.identity, torrent.status.total_wanted_done).into_bytes())
    }

    async fn apply_settings(&self, settings: EngineSettings) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.reject_settings {
            return Err(EngineError::Rejected("invalid settings pack".into()));
        }
        state.settings.push(settings);
        Ok(())
    }
}
