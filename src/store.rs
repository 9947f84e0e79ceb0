//! Persistent sync state.
//!
//! The last-applied fingerprint and range sets live in a single JSON
//! document. The record is replaced wholesale after a successful pass and
//! never partially mutated, so a reader always sees a snapshot that was
//! applied as a unit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::SyncError;
use crate::rules::{IpVersion, RangeSet};

/// Last-applied snapshot, as persisted.
///
/// `etag` is absent until the first successful pass. The on-disk layout is
/// `{"etag": ..., "ips_v4": [...], "ips_v6": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub etag: Option<String>,
    #[serde(default)]
    pub ips_v4: BTreeSet<String>,
    #[serde(default)]
    pub ips_v6: BTreeSet<String>,
}

impl SyncState {
    pub fn new(etag: String, ips_v4: BTreeSet<String>, ips_v6: BTreeSet<String>) -> Self {
        Self {
            etag: Some(etag),
            ips_v4,
            ips_v6,
        }
    }

    /// Whether any pass has ever been applied.
    pub fn is_first_run(&self) -> bool {
        self.etag.is_none()
    }

    pub fn ipv4_ranges(&self) -> RangeSet {
        RangeSet::new(IpVersion::V4, self.ips_v4.iter().cloned())
    }

    pub fn ipv6_ranges(&self) -> RangeSet {
        RangeSet::new(IpVersion::V6, self.ips_v6.iter().cloned())
    }
}

/// Durable store for the last-applied [`SyncState`].
pub trait StateStore: Send + Sync {
    /// Read the last-applied state. Absence of a record is the default
    /// empty state, not an error.
    fn read(&self) -> Result<SyncState, SyncError>;

    /// Replace the persisted record with `state`, atomically from a
    /// reader's perspective.
    fn write(&self, state: &SyncState) -> Result<(), SyncError>;
}

/// JSON file store at a path chosen at construction.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStore {
    fn read(&self) -> Result<SyncState, SyncError> {
        if !self.path.exists() {
            debug!("No state file at {:?}, starting from empty state", self.path);
            return Ok(SyncState::default());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| SyncError::StoreCorrupt(format!("{:?}: {}", self.path, e)))?;

        serde_json::from_str(&content)
            .map_err(|e| SyncError::StoreCorrupt(format!("{:?}: {}", self.path, e)))
    }

    fn write(&self, state: &SyncState) -> Result<(), SyncError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .map_err(|e| SyncError::StoreUnwritable(format!("{:?}: {}", parent, e)))?;

        let content = serde_json::to_string_pretty(state)
            .map_err(|e| SyncError::StoreUnwritable(e.to_string()))?;

        // Write to a temp file in the same directory, then rename into
        // place, so a crash mid-write never leaves a torn record.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| SyncError::StoreUnwritable(format!("{:?}: {}", parent, e)))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| SyncError::StoreUnwritable(e.to_string()))?;
        tmp.persist(&self.path)
            .map_err(|e| SyncError::StoreUnwritable(format!("{:?}: {}", self.path, e)))?;

        debug!("Wrote state file {:?}", self.path);
        Ok(())
    }
}
