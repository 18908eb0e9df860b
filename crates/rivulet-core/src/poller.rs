//! Status polling and change detection

use crate::engine_adapter::{EngineAdapter, EngineError};
use crate::registry::TorrentRegistry;
use crate::types::{TorrentIdentity, TorrentSnapshot};
use futures::future::join_all;
use std::time::Duration;

/// Cadence of the status poll.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Smallest numeric delta that counts as a change.
///
/// Shared by progress (percent) and both rates (bytes/s); tunable, not a
/// precision guarantee.
pub const DEFAULT_CHANGE_THRESHOLD: f64 = 0.1;

/// Decides whether a new snapshot is worth a notification
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    threshold: f64,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CHANGE_THRESHOLD,
        }
    }
}

impl ChangeDetector {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Only progress, rates, lifecycle state and peer count are compared.
    pub fn has_changed(&self, previous: Option<&TorrentSnapshot>, current: &TorrentSnapshot) -> bool {
        let Some(previous) = previous else {
            return true;
        };

        self.differs(previous.progress, current.progress)
            || self.differs(previous.download_rate, current.download_rate)
            || self.differs(previous.upload_rate, current.upload_rate)
            || previous.state != current.state
            || previous.num_peers != current.num_peers
    }

    fn differs(&self, old: f64, new: f64) -> bool {
        (old - new).abs() > self.threshold
    }
}

/// Query every registered torrent concurrently.
///
/// Results come back in registry order; nothing is applied here.
pub async fn poll_all(
    adapter: &EngineAdapter,
    registry: &TorrentRegistry,
) -> Vec<(TorrentIdentity, Result<TorrentSnapshot, EngineError>)> {
    let requests = registry.iter().map(|entry| async move {
        (entry.identity(), adapter.snapshot(&entry.handle).await)
    });
    join_all(requests).await
}
