//! Session settings coordination

use crate::engine_adapter::{EngineAdapter, EngineSettings};
use crate::error::Result;
use crate::types::Settings;

/// Convert settings to engine configuration
///
/// Both rate limits are always present so that applying a configuration
/// fully determines engine state.
pub fn settings_to_engine_config(settings: &Settings) -> EngineSettings {
    EngineSettings {
        user_agent: settings.user_agent.clone(),
        enable_dht: settings.enable_dht,
        enable_lsd: settings.enable_lsd,
        enable_upnp: settings.enable_upnp,
        enable_natpmp: settings.enable_upnp,
        connections_limit: settings.max_connections,
        unchoke_slots_limit: settings.max_uploads,
        download_rate_limit: rate_limit(settings.limit_download, settings.download_limit),
        upload_rate_limit: rate_limit(settings.limit_upload, settings.upload_limit),
    }
}

/// KiB/s to bytes/s, 0 (unlimited) when the limit is switched off
fn rate_limit(enabled: bool, kib_per_sec: u64) -> u64 {
    if enabled {
        kib_per_sec.saturating_mul(1024)
    } else {
        0
    }
}

/// Pushes configuration snapshots to the engine
#[derive(Debug, Default)]
pub struct SettingsCoordinator {
    bound_port: Option<u16>,
}

impl SettingsCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bound_port(&self) -> Option<u16> {
        self.bound_port
    }

    /// Rebind the listen range if the port moved, then apply everything else
    /// in a single engine update.
    pub async fn apply(&mut self, adapter: &EngineAdapter, settings: &Settings) -> Result<()> {
        if self.bound_port != Some(settings.listen_port) {
            adapter.listen_on(settings.listen_port).await?;
            log::info!("Listening on port {}", settings.listen_port);
            self.bound_port = Some(settings.listen_port);
        }

        adapter
            .apply_settings(settings_to_engine_config(settings))
            .await?;
        Ok(())
    }
}
