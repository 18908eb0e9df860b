//! Rivulet Core Library
//!
//! This crate provides the torrent session orchestrator that sits between a
//! BitTorrent engine and the Rivulet user interface: torrent bookkeeping,
//! deferred file selection, completion detection, change-filtered polling,
//! resume persistence and settings. It is UI-agnostic and engine-agnostic;
//! the engine is supplied through the [`TorrentEngine`] trait.

pub mod completion;
pub mod db;
pub mod engine_adapter;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod resume;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_support;

/// Application id, used for data directories
pub const APP_ID: &str = "io.github.rivulet.Rivulet";

// Re-exports for convenience
pub use db::{get_db_path, init_database, Database, SettingsDb};
pub use engine_adapter::{
    AddTorrentParams, EngineAdapter, EngineError, EngineHandle, EngineSettings, EngineState,
    EngineStatus, FilePriority, TorrentEngine,
};
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use poller::{ChangeDetector, POLL_INTERVAL};
pub use resume::{get_resume_dir, ResumeStore};
pub use service::{EngineCommand, TorrentService, UiMessage};
pub use settings::settings_to_engine_config;
pub use types::*;
pub use utils::{calculate_progress, format_bytes, format_eta, format_speed};
