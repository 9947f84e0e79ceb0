//! File-based locking to prevent concurrent passes.
//!
//! The state cache write is atomic, but two overlapping passes could still
//! interleave firewall mutations. An flock-style advisory lock keeps the
//! single-writer assumption honest when the scheduler misfires.

use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::error::SyncError;

const LOCK_FILE: &str = "/run/cfsync.lock";

/// Holds an exclusive lock on the cfsync lock file; released on drop.
pub struct LockGuard {
    _file: File,
}

impl LockGuard {
    /// Acquire the exclusive lock, failing if another pass is running.
    pub fn acquire() -> Result<Self, SyncError> {
        Self::acquire_at(Path::new(LOCK_FILE))
    }

    pub fn acquire_at(path: &Path) -> Result<Self, SyncError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }

        // Open with create but not truncate, so creation and locking leave
        // no window for a second instance to slip through.
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| SyncError::Lock(format!("failed to open lock file {:?}: {}", path, e)))?;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .map_err(|e| SyncError::Lock(format!("failed to set lock permissions: {}", e)))?;

        file.try_lock_exclusive().map_err(|_| {
            SyncError::Lock(format!(
                "another cfsync pass is already running (lock file {:?})",
                path
            ))
        })?;

        Ok(Self { _file: file })
    }
}
