//! Persisted marker of the last manifest that was fully applied.
//!
//! The cache holds the manifest's `timestamp` string verbatim. A matching
//! value lets the next attempt skip reconciliation entirely.

use crate::utils::errors::{Result, SyncError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CACHE_FILE: &str = "timestamp.cache";

#[derive(Debug, Clone)]
pub struct SyncCache {
    path: PathBuf,
}

impl SyncCache {
    /// Cache stored as `timestamp.cache` inside the sync directory.
    pub fn in_dir(sync_dir: &Path) -> Self {
        Self {
            path: sync_dir.join(CACHE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last committed timestamp, or `None` if no pass has completed yet.
    pub fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::fs(&self.path, e)),
        }
    }

    /// Exact string comparison against the committed value.
    ///
    /// An unreadable cache counts as a miss.
    pub fn is_current(&self, timestamp: &str) -> bool {
        match self.read() {
            Ok(Some(cached)) => cached == timestamp,
            Ok(None) => false,
            Err(e) => {
                debug!("Ignoring unreadable sync cache: {}", e);
                false
            }
        }
    }

    /// Atomically replace the committed timestamp.
    pub fn commit(&self, timestamp: &str) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir).map_err(|e| SyncError::fs(dir, e))?;

        let tmp = dir.join(format!(".{}.{}.part", CACHE_FILE, uuid::Uuid::new_v4()));
        std::fs::write(&tmp, timestamp).map_err(|e| SyncError::fs(&tmp, e))?;

        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(SyncError::fs(&self.path, e));
        }

        Ok(())
    }

    /// Forget the committed timestamp so the next attempt runs a full pass.
    pub fn invalidate(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::fs(&self.path, e)),
        }
    }
}
