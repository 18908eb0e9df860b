//! Torrent session orchestrator
//!
//! Owns every live torrent and is the only thing that mutates them. All
//! methods take `&mut self`, so whoever drives the orchestrator (see
//! [`crate::service`]) serializes commands and poll ticks by construction.

use crate::completion::CompletionTracker;
use crate::engine_adapter::{EngineAdapter, EngineError, EngineHandle, FilePriority};
use crate::error::{Error, Result};
use crate::poller::{poll_all, ChangeDetector};
use crate::registry::TorrentRegistry;
use crate::resume::{RestoredTorrent, ResumeStore, SaveReport};
use crate::scheduler::PrioritySchedule;
use crate::service::UiMessage;
use crate::settings::SettingsCoordinator;
use crate::types::{
    FileSelection, PersistedTorrentRecord, Settings, TorrentIdentity, TorrentSnapshot,
    TorrentSource,
};
use crate::utils::{format_bytes, format_eta, format_speed};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const MAGNET_PREFIX: &str = "magnet:?";

pub struct Orchestrator {
    adapter: EngineAdapter,
    registry: TorrentRegistry,
    store: ResumeStore,
    schedule: PrioritySchedule,
    completion: CompletionTracker,
    detector: ChangeDetector,
    coordinator: SettingsCoordinator,
    settings: Settings,
    ui_sender: async_channel::Sender<UiMessage>,
}

impl Orchestrator {
    pub fn new(
        adapter: EngineAdapter,
        store: ResumeStore,
        settings: Settings,
        ui_sender: async_channel::Sender<UiMessage>,
    ) -> Self {
        Self {
            adapter,
            registry: TorrentRegistry::new(),
            store,
            schedule: PrioritySchedule::new(),
            completion: CompletionTracker::new(),
            detector: ChangeDetector::default(),
            coordinator: SettingsCoordinator::new(),
            settings,
            ui_sender,
        }
    }

    pub fn with_change_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn get(&self, identity: &TorrentIdentity) -> Option<&TorrentSnapshot> {
        self.registry.get(identity)
    }

    pub fn all(&self) -> HashMap<TorrentIdentity, TorrentSnapshot> {
        self.registry.all()
    }

    pub fn identities(&self) -> Vec<TorrentIdentity> {
        self.registry.identities()
    }

    pub fn pending_selection(&self, identity: &TorrentIdentity) -> Option<&FileSelection> {
        self.schedule.pending(identity)
    }

    /// Bring the engine session up and restore the previous session.
    ///
    /// Returns how many torrents were restored.
    pub async fn start(&mut self) -> usize {
        if let Err(e) = self.coordinator.apply(&self.adapter, &self.settings).await {
            self.emit_error("Settings Error", format!("Failed to apply settings: {}", e))
                .await;
        }

        if self.settings.enable_dht {
            if let Err(e) = self.adapter.start_dht().await {
                log::warn!("Failed to start DHT: {}", e);
            }
        }

        if let Err(e) = std::fs::create_dir_all(&self.settings.download_path) {
            log::warn!(
                "Failed to create download directory {:?}: {}",
                self.settings.download_path,
                e
            );
        }

        match self.restore().await {
            Ok(count) => {
                log::info!("Restored {} torrents from resume data", count);
                count
            }
            Err(e) => {
                self.emit_error("Load Error", format!("Error loading resume data: {}", e))
                    .await;
                0
            }
        }
    }

    /// Re-add every torrent the resume store still has a blob for.
    pub async fn restore(&mut self) -> Result<usize> {
        let mut count = 0;

        for RestoredTorrent {
            mut record,
            resume_data,
        } in self.store.load()?
        {
            let handle = match self
                .adapter
                .add(record.source.clone(), record.save_path.clone(), Some(resume_data))
                .await
            {
                Ok(handle) => handle,
                Err(e) => {
                    log::warn!("Error loading torrent {}: {}", record.identity, e);
                    continue;
                }
            };

            let identity = handle.identity();
            if identity != record.identity {
                log::warn!(
                    "Engine reported {} for saved torrent {}",
                    identity,
                    record.identity
                );
                record.identity = identity;
            }

            let snapshot = self.initial_snapshot(&handle, &record.save_path).await;
            record.source = self.keep_torrent_file(&identity, record.source);
            let pending = record.pending_selection.take();
            let completed = record.completed;

            if let Err(e) = self.registry.insert(handle, record, snapshot.clone()) {
                log::warn!("Skipping restored torrent {}: {}", identity, e);
                continue;
            }
            if completed {
                self.completion.mark(identity);
            }
            if let Some(selection) = pending {
                self.schedule.request(identity, selection);
            }

            self.emit(UiMessage::TorrentAdded(identity, snapshot)).await;
            count += 1;
        }

        Ok(count)
    }

    /// Add a torrent from a `.torrent` file
    pub async fn add_torrent_file(
        &mut self,
        path: PathBuf,
        save_path: Option<PathBuf>,
        selected_files: Option<FileSelection>,
    ) -> Result<TorrentIdentity> {
        let result = if path.is_file() {
            self.add(TorrentSource::File(path), save_path, selected_files)
                .await
        } else {
            Err(Error::InvalidInput(format!(
                "torrent file {:?} does not exist",
                path
            )))
        };

        if let Err(e) = &result {
            self.emit_error("Add Torrent Error", format!("Failed to add torrent file: {}", e))
                .await;
        }
        result
    }

    /// Add a torrent from a magnet link
    pub async fn add_magnet(
        &mut self,
        uri: String,
        save_path: Option<PathBuf>,
        selected_files: Option<FileSelection>,
    ) -> Result<TorrentIdentity> {
        let result = if uri.trim_start().starts_with(MAGNET_PREFIX) {
            self.add(TorrentSource::Magnet(uri.trim().to_string()), save_path, selected_files)
                .await
        } else {
            Err(Error::InvalidInput(format!("not a magnet link: {}", uri)))
        };

        if let Err(e) = &result {
            self.emit_error("Add Magnet Error", format!("Failed to add magnet link: {}", e))
                .await;
        }
        result
    }

    async fn add(
        &mut self,
        source: TorrentSource,
        save_path: Option<PathBuf>,
        selected_files: Option<FileSelection>,
    ) -> Result<TorrentIdentity> {
        let save_path = save_path.unwrap_or_else(|| PathBuf::from(&self.settings.download_path));

        let handle = self
            .adapter
            .add(source.clone(), save_path.clone(), None)
            .await?;
        let identity = handle.identity();
        if self.registry.contains(&identity) {
            return Err(Error::AlreadyExists(format!(
                "torrent {} is already in the session",
                identity
            )));
        }

        let snapshot = self.initial_snapshot(&handle, &save_path).await;
        let source = self.keep_torrent_file(&identity, source);
        let mut record = PersistedTorrentRecord::new(identity, save_path, source);
        if snapshot.metadata_available {
            record.name = snapshot.name.clone();
        }
        self.registry.insert(handle, record, snapshot.clone())?;
        log::info!("Added torrent {} ({})", snapshot.name, identity);

        if let Some(selection) = selected_files {
            self.schedule.request(identity, selection);
            if snapshot.metadata_available {
                self.apply_pending(&identity, snapshot.file_count).await;
            }
        }

        self.emit(UiMessage::TorrentAdded(identity, snapshot)).await;
        self.persist().await;
        Ok(identity)
    }

    /// Point `.torrent` sources at the store's own copy of the file.
    fn keep_torrent_file(&self, identity: &TorrentIdentity, source: TorrentSource) -> TorrentSource {
        let TorrentSource::File(path) = source else {
            return source;
        };
        match self.store.store_torrent_file(identity, &path) {
            Ok(copy) => TorrentSource::File(copy),
            Err(e) => {
                log::warn!("Failed to keep a copy of {:?}: {}", path, e);
                TorrentSource::File(path)
            }
        }
    }

    async fn initial_snapshot(
        &self,
        handle: &EngineHandle,
        save_path: &Path,
    ) -> TorrentSnapshot {
        match self.adapter.snapshot(handle).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("Status unavailable for new torrent {}: {}", handle.identity(), e);
                TorrentSnapshot::unavailable(handle.identity(), save_path.to_path_buf())
            }
        }
    }

    pub async fn pause(&mut self, identity: &TorrentIdentity) -> Result<()> {
        let Some(handle) = self.registry.handle(identity) else {
            log::debug!("Pause ignored, unknown torrent {}", identity);
            return Err(Error::NotFound(identity.to_string()));
        };

        let result = self.adapter.pause(handle).await.map_err(Error::from);
        if let Err(e) = &result {
            self.emit_error("Pause Error", format!("Failed to pause torrent {}: {}", identity, e))
                .await;
        }
        result
    }

    pub async fn resume(&mut self, identity: &TorrentIdentity) -> Result<()> {
        let Some(handle) = self.registry.handle(identity) else {
            log::debug!("Resume ignored, unknown torrent {}", identity);
            return Err(Error::NotFound(identity.to_string()));
        };

        let result = self.adapter.resume(handle).await.map_err(Error::from);
        if let Err(e) = &result {
            self.emit_error("Resume Error", format!("Failed to resume torrent {}: {}", identity, e))
                .await;
        }
        result
    }

    /// Remove a torrent, optionally deleting its downloaded data
    pub async fn remove(&mut self, identity: &TorrentIdentity, delete_files: bool) -> Result<()> {
        let Some(handle) = self.registry.handle(identity) else {
            log::debug!("Remove ignored, unknown torrent {}", identity);
            return Err(Error::NotFound(identity.to_string()));
        };

        match self.adapter.remove(handle, delete_files).await {
            Ok(()) => {}
            // Already gone from the engine; still purge our side.
            Err(EngineError::InvalidHandle(detail)) => {
                log::warn!("Engine no longer knows {}: {}", identity, detail);
            }
            Err(e) => {
                let err = Error::from(e);
                self.emit_error(
                    "Remove Torrent Error",
                    format!("Failed to remove torrent {}: {}", identity, err),
                )
                .await;
                return Err(err);
            }
        }

        self.registry.remove(identity)?;
        self.schedule.cancel(identity);
        self.completion.forget(identity);
        log::info!("Removed torrent {} (delete files: {})", identity, delete_files);

        self.emit(UiMessage::TorrentRemoved(*identity)).await;
        self.persist().await;
        Ok(())
    }

    pub async fn apply_settings(&mut self, settings: Settings) -> Result<()> {
        if let Err(e) = self.coordinator.apply(&self.adapter, &settings).await {
            self.emit_error("Settings Error", format!("Failed to apply settings: {}", e))
                .await;
            return Err(e);
        }

        if settings.download_path != self.settings.download_path {
            if let Err(e) = std::fs::create_dir_all(&settings.download_path) {
                log::warn!(
                    "Failed to create download directory {:?}: {}",
                    settings.download_path,
                    e
                );
            }
        }
        self.settings = settings;
        Ok(())
    }

    /// Change the default save path for torrents added without one
    pub async fn set_download_path(&mut self, path: PathBuf) -> Result<()> {
        if let Err(e) = std::fs::create_dir_all(&path) {
            let err = Error::from(e);
            self.emit_error(
                "Download Path Error",
                format!("Failed to use download path {:?}: {}", path, err),
            )
            .await;
            return Err(err);
        }

        self.settings.download_path = path.to_string_lossy().to_string();
        log::info!("Default download path set to {:?}", path);
        Ok(())
    }

    /// One poll pass over every registered torrent.
    pub async fn tick(&mut self) {
        let results = poll_all(&self.adapter, &self.registry).await;

        for (identity, result) in results {
            let snapshot = match result {
                Ok(snapshot) => snapshot,
                Err(EngineError::InvalidHandle(detail)) => {
                    log::debug!("Skipping {} this tick: invalid handle ({})", identity, detail);
                    continue;
                }
                Err(e) => {
                    self.emit_error(
                        "Update Error",
                        format!("Error updating torrent {}: {}", identity, e),
                    )
                    .await;
                    continue;
                }
            };

            if snapshot.metadata_available && self.schedule.has_pending(&identity) {
                self.apply_pending(&identity, snapshot.file_count).await;
            }

            if self.completion.observe(&snapshot) {
                if let Some(entry) = self.registry.entry_mut(&identity) {
                    entry.record.completed = true;
                }
                log::info!(
                    "Torrent completed: {} ({})",
                    snapshot.name,
                    format_bytes(snapshot.total_size)
                );
                self.emit(UiMessage::TorrentCompleted(identity, snapshot.clone()))
                    .await;
                self.persist().await;
            }

            let changed = self
                .detector
                .has_changed(self.registry.get(&identity), &snapshot);
            self.registry.update_snapshot(snapshot.clone());

            if changed {
                log::trace!(
                    "{}: {:.1}% {} down {} up, eta {}",
                    identity,
                    snapshot.progress,
                    format_speed(snapshot.download_rate),
                    format_speed(snapshot.upload_rate),
                    format_eta(snapshot.eta)
                );
                self.emit(UiMessage::TorrentUpdated(identity, snapshot)).await;
            }
        }
    }

    /// Apply a parked selection now that the file list is known.
    async fn apply_pending(&mut self, identity: &TorrentIdentity, file_count: Option<usize>) {
        let (Some(handle), Some(selection), Some(num_files)) = (
            self.registry.handle(identity),
            self.schedule.pending(identity),
            file_count,
        ) else {
            return;
        };

        match self.adapter.apply_selection(handle, selection, num_files).await {
            Ok(priorities) => {
                self.schedule.take(identity);
                log::info!(
                    "Applied file selection to {} ({} of {} files)",
                    identity,
                    priorities
                        .iter()
                        .filter(|p| **p != FilePriority::Skip)
                        .count(),
                    num_files
                );
            }
            Err(EngineError::InvalidHandle(_)) | Err(EngineError::MetadataUnavailable) => {
                log::debug!("File selection for {} deferred to next tick", identity);
            }
            Err(e) => {
                self.schedule.take(identity);
                self.emit_error(
                    "File Priority Error",
                    format!("Failed to set file priorities for {}: {}", identity, e),
                )
                .await;
            }
        }
    }

    /// Export every resume blob and rewrite the manifest
    pub async fn save_resume_state(&self) -> Result<SaveReport> {
        let mut exports = Vec::with_capacity(self.registry.len());

        for entry in self.registry.iter() {
            let mut record = entry.record.clone();
            record.pending_selection = self.schedule.pending(&record.identity).cloned();
            record.completed = self.completion.is_completed(&record.identity);

            let export = self
                .adapter
                .export_resume_state(&entry.handle)
                .await
                .map_err(Error::from);
            exports.push((record, export));
        }

        self.store.save(exports)
    }

    async fn persist(&self) {
        if let Err(e) = self.save_resume_state().await {
            log::error!("Failed to save resume data: {}", e);
            self.emit_error("Save Error", format!("Error saving resume data: {}", e))
                .await;
        }
    }

    /// Save, pause everything, then drop all in-memory state.
    ///
    /// Every step runs even if an earlier one fails.
    pub async fn shutdown(&mut self) {
        let mut failures = Vec::new();

        match self.save_resume_state().await {
            Ok(report) if !report.is_complete() => {
                log::warn!("{} torrents were not saved at shutdown", report.skipped.len());
            }
            Ok(_) => {}
            Err(e) => failures.push(format!("saving resume data: {}", e)),
        }

        for entry in self.registry.iter() {
            match self.adapter.pause(&entry.handle).await {
                Ok(()) | Err(EngineError::InvalidHandle(_)) => {}
                Err(e) => failures.push(format!("pausing {}: {}", entry.identity(), e)),
            }
        }

        self.registry.clear();
        self.schedule.clear();
        self.completion.clear();
        log::info!("Torrent session shut down");

        if !failures.is_empty() {
            let message = format!("Error during shutdown: {}", failures.join("; "));
            self.emit_error("Shutdown Error", message).await;
        }
    }

    async fn emit(&self, message: UiMessage) {
        if self.ui_sender.send(message).await.is_err() {
            log::debug!("UI receiver dropped, event discarded");
        }
    }

    async fn emit_error(&self, title: &str, message: String) {
        log::warn!("{}: {}", title, message);
        self.emit(UiMessage::Error {
            title: title.to_string(),
            message,
        })
        .await;
    }
}
