//! Resume state persistence
//!
//! A session survives restarts as one manifest (`session.json`) listing every
//! torrent, plus one opaque `<info-hash>.resume` blob per torrent. Blobs are
//! always written before the manifest so that no manifest entry points at a
//! blob that was never written. Torrents added from a `.torrent` file also
//! keep a private `<info-hash>.torrent` copy here, so a restart does not
//! depend on the user's original file.

use crate::error::{Error, Result};
use crate::types::{PersistedTorrentRecord, TorrentIdentity, TorrentSource};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const MANIFEST_FILE: &str = "session.json";
const RESUME_EXTENSION: &str = "resume";
const TORRENT_EXTENSION: &str = "torrent";
const MANIFEST_VERSION: u32 = 1;

/// Get the default resume data directory
pub fn get_resume_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::APP_ID)
        .join("resume_data")
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    torrents: Vec<PersistedTorrentRecord>,
}

/// A torrent read back from disk, ready to be handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct RestoredTorrent {
    pub record: PersistedTorrentRecord,
    pub resume_data: Vec<u8>,
}

/// Outcome of a bulk save
#[derive(Debug, Default)]
pub struct SaveReport {
    /// Identities listed in the manifest that was written.
    pub saved: Vec<TorrentIdentity>,
    /// Torrents whose blob could not be refreshed, with the reason.
    pub skipped: Vec<(TorrentIdentity, String)>,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Manifest and blob files under one directory
#[derive(Debug, Clone)]
pub struct ResumeStore {
    dir: PathBuf,
}

impl ResumeStore {
    /// Open (and create if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        log::info!("Resume data directory: {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn blob_path(&self, identity: &TorrentIdentity) -> PathBuf {
        self.dir
            .join(format!("{}.{}", identity.to_hex(), RESUME_EXTENSION))
    }

    pub fn has_blob(&self, identity: &TorrentIdentity) -> bool {
        self.blob_path(identity).is_file()
    }

    pub fn write_blob(&self, identity: &TorrentIdentity, blob: &[u8]) -> Result<()> {
        write_atomic(&self.blob_path(identity), blob)
    }

    pub fn torrent_file_path(&self, identity: &TorrentIdentity) -> PathBuf {
        self.dir
            .join(format!("{}.{}", identity.to_hex(), TORRENT_EXTENSION))
    }

    /// Copy a `.torrent` file into the store and return the copy's path
    pub fn store_torrent_file(&self, identity: &TorrentIdentity, source: &Path) -> Result<PathBuf> {
        let target = self.torrent_file_path(identity);
        if source == target {
            return Ok(target);
        }
        write_atomic(&target, &fs::read(source)?)?;
        Ok(target)
    }

    /// Persist the session.
    ///
    /// `exports` pairs each registry record with the engine's resume export for
    /// it, in registry order. A failed export or blob write skips only that
    /// torrent; the manifest still lists it if an older blob is on disk. A
    /// failed manifest write is returned as an error. Stored `.torrent`
    /// copies are kept for every record passed in, listed or not.
    pub fn save(
        &self,
        exports: Vec<(PersistedTorrentRecord, Result<Vec<u8>>)>,
    ) -> Result<SaveReport> {
        let mut report = SaveReport::default();
        let mut records = Vec::with_capacity(exports.len());
        let mut live = HashSet::with_capacity(exports.len());

        for (record, export) in exports {
            let identity = record.identity;
            live.insert(identity);
            let written = export.and_then(|blob| self.write_blob(&identity, &blob));
            if let Err(e) = written {
                log::warn!("Failed to save resume data for {}: {}", identity, e);
                report.skipped.push((identity, e.to_string()));
            }

            if self.has_blob(&identity) {
                records.push(record);
            }
        }

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            torrents: records,
        };
        let bytes = serde_json::to_vec_pretty(&manifest)?;
        write_atomic(&self.manifest_path(), &bytes)?;

        report.saved = manifest.torrents.iter().map(|r| r.identity).collect();
        let keep: HashSet<TorrentIdentity> = report.saved.iter().copied().collect();
        self.prune(&keep, &live);

        log::debug!(
            "Saved resume state for {} torrents ({} skipped)",
            report.saved.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Read the manifest and every usable blob.
    ///
    /// Records whose blob is missing or whose torrent file has disappeared
    /// are skipped with a warning.
    pub fn load(&self) -> Result<Vec<RestoredTorrent>> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let manifest: Manifest = serde_json::from_slice(&fs::read(&path)?)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::InvalidInput(format!(
                "unsupported session manifest version {}",
                manifest.version
            )));
        }

        let mut restored = Vec::with_capacity(manifest.torrents.len());
        for record in manifest.torrents {
            if let TorrentSource::File(torrent_file) = &record.source {
                if !torrent_file.exists() {
                    log::warn!(
                        "Skipping {}: torrent file {:?} no longer exists",
                        record.identity,
                        torrent_file
                    );
                    continue;
                }
            }

            match fs::read(self.blob_path(&record.identity)) {
                Ok(resume_data) => restored.push(RestoredTorrent {
                    record,
                    resume_data,
                }),
                Err(e) => {
                    log::warn!("Skipping {}: resume data unavailable: {}", record.identity, e);
                }
            }
        }

        Ok(restored)
    }

    /// Delete blobs not in `blobs` and torrent copies not in `torrents`.
    fn prune(&self, blobs: &HashSet<TorrentIdentity>, torrents: &HashSet<TorrentIdentity>) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Failed to scan resume directory {:?}: {}", self.dir, e);
                return;
            }
        };

        for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
            let keep = match path.extension().and_then(|e| e.to_str()) {
                Some(RESUME_EXTENSION) => blobs,
                Some(TORRENT_EXTENSION) => torrents,
                _ => continue,
            };
            let Some(identity) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<TorrentIdentity>().ok())
            else {
                continue;
            };
            if !keep.contains(&identity) {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("Failed to remove stale file {:?}: {}", path, e);
                }
            }
        }
    }
}

/// Write `bytes` to a temp file beside `path`, sync it, then rename into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::InvalidInput(format!("no parent directory for {:?}", path)))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("invalid file name {:?}", path)))?;
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(Into::into)
}
