//! Torrent service - bridges the tokio runtime with the UI main loop

use crate::db::{Database, SettingsDb};
use crate::engine_adapter::{EngineAdapter, TorrentEngine};
use crate::orchestrator::Orchestrator;
use crate::poller::{ChangeDetector, POLL_INTERVAL};
use crate::resume::ResumeStore;
use crate::types::{FileSelection, Settings, TorrentIdentity, TorrentSnapshot};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;

/// Commands sent from UI to the engine (via async channel)
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Add a `.torrent` file
    AddTorrentFile {
        path: PathBuf,
        save_path: Option<PathBuf>,
        selected_files: Option<FileSelection>,
    },
    /// Add a magnet link
    AddMagnet {
        uri: String,
        save_path: Option<PathBuf>,
        selected_files: Option<FileSelection>,
    },
    /// Pause a torrent
    Pause(TorrentIdentity),
    /// Resume a torrent
    Resume(TorrentIdentity),
    /// Remove a torrent
    Remove {
        identity: TorrentIdentity,
        delete_files: bool,
    },
    /// Replace the session settings
    ApplySettings(Settings),
    /// Change the default save path
    SetDownloadPath(PathBuf),
    /// Save, pause everything and stop the service
    Shutdown,
}

/// Messages sent from engine to UI (via channel)
#[derive(Debug, Clone)]
pub enum UiMessage {
    /// Session is up and the previous session restored
    EngineReady,
    /// A torrent was added or restored
    TorrentAdded(TorrentIdentity, TorrentSnapshot),
    /// A torrent changed noticeably since the last notification
    TorrentUpdated(TorrentIdentity, TorrentSnapshot),
    /// A torrent was removed
    TorrentRemoved(TorrentIdentity),
    /// A torrent finished downloading
    TorrentCompleted(TorrentIdentity, TorrentSnapshot),
    /// Something failed; `title` names the operation
    Error { title: String, message: String },
}

/// Torrent service that runs in a separate thread with tokio
pub struct TorrentService {
    adapter: EngineAdapter,
    store: ResumeStore,
    settings: Settings,
    detector: ChangeDetector,
    db: Option<Database>,
}

impl TorrentService {
    pub fn new(engine: Arc<dyn TorrentEngine>, store: ResumeStore, settings: Settings) -> Self {
        Self {
            adapter: EngineAdapter::new(engine),
            store,
            settings,
            detector: ChangeDetector::default(),
            db: None,
        }
    }

    /// Persist settings changes to `db` as they are applied
    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_change_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = detector;
        self
    }

    /// Spawn the service in a background thread
    /// Takes the command receiver to process commands from the UI
    pub fn spawn(
        self,
        ui_sender: async_channel::Sender<UiMessage>,
        cmd_receiver: async_channel::Receiver<EngineCommand>,
    ) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to create tokio runtime: {}", e);
                    let _ = ui_sender.send_blocking(UiMessage::Error {
                        title: "Startup Error".to_string(),
                        message: format!("Failed to create tokio runtime: {}", e),
                    });
                    return;
                }
            };

            rt.block_on(self.run(ui_sender, cmd_receiver));
        })
    }

    /// Drive the session until `Shutdown` arrives or the UI hangs up
    pub async fn run(
        self,
        ui_sender: async_channel::Sender<UiMessage>,
        cmd_receiver: async_channel::Receiver<EngineCommand>,
    ) {
        let db = self.db;
        let mut orchestrator =
            Orchestrator::new(self.adapter, self.store, self.settings, ui_sender.clone())
                .with_change_detector(self.detector);

        orchestrator.start().await;

        // Notify UI that engine is ready
        let _ = ui_sender.send(UiMessage::EngineReady).await;

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Handle commands from UI
                cmd_result = cmd_receiver.recv() => {
                    match cmd_result {
                        Ok(EngineCommand::Shutdown) => {
                            log::info!("Torrent service shutting down");
                            break;
                        }
                        Ok(cmd) => {
                            handle_command(&mut orchestrator, db.as_ref(), cmd).await;
                        }
                        Err(_) => {
                            log::warn!("Command channel closed");
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    orchestrator.tick().await;
                }
            }
        }

        orchestrator.shutdown().await;
    }
}

/// Handle a command from the UI
///
/// The orchestrator reports failures to the UI itself, so results are only
/// logged here.
async fn handle_command(orchestrator: &mut Orchestrator, db: Option<&Database>, cmd: EngineCommand) {
    match cmd {
        EngineCommand::AddTorrentFile {
            path,
            save_path,
            selected_files,
        } => {
            if let Err(e) = orchestrator
                .add_torrent_file(path, save_path, selected_files)
                .await
            {
                log::debug!("Add torrent file failed: {}", e);
            }
        }

        EngineCommand::AddMagnet {
            uri,
            save_path,
            selected_files,
        } => {
            if let Err(e) = orchestrator.add_magnet(uri, save_path, selected_files).await {
                log::debug!("Add magnet failed: {}", e);
            }
        }

        EngineCommand::Pause(identity) => {
            if let Err(e) = orchestrator.pause(&identity).await {
                log::debug!("Pause failed: {}", e);
            }
        }

        EngineCommand::Resume(identity) => {
            if let Err(e) = orchestrator.resume(&identity).await {
                log::debug!("Resume failed: {}", e);
            }
        }

        EngineCommand::Remove {
            identity,
            delete_files,
        } => {
            if let Err(e) = orchestrator.remove(&identity, delete_files).await {
                log::debug!("Remove failed: {}", e);
            }
        }

        EngineCommand::ApplySettings(settings) => {
            if orchestrator.apply_settings(settings).await.is_ok() {
                persist_settings(orchestrator.settings(), db);
            }
        }

        EngineCommand::SetDownloadPath(path) => {
            if orchestrator.set_download_path(path).await.is_ok() {
                if let Some(db) = db {
                    if let Err(e) =
                        SettingsDb::set(db, "download_path", &orchestrator.settings().download_path)
                    {
                        log::warn!("Failed to persist download path: {}", e);
                    }
                }
            }
        }

        EngineCommand::Shutdown => {
            // Handled in the main loop
        }
    }
}

fn persist_settings(settings: &Settings, db: Option<&Database>) {
    let Some(db) = db else {
        return;
    };
    if let Err(e) = SettingsDb::save(db, settings) {
        log::warn!("Failed to persist settings: {}", e);
    }
}
