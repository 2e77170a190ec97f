//! Host-facing view of the synced mods directory.
//!
//! The mod loader asks the locator for candidate mod files after a sync
//! attempt. Synced content is only offered when the attempt converged or was
//! skipped because the cache was current.

use crate::fs::walker::{scan, LocalFile};
use crate::sync::orchestrator::{SyncContext, SyncOutcome};
use crate::utils::errors::{Result, SyncError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct SyncLocator {
    mods_dir: PathBuf,
    use_synced: bool,
}

impl SyncLocator {
    pub fn new(mods_dir: impl Into<PathBuf>, use_synced: bool) -> Self {
        Self {
            mods_dir: mods_dir.into(),
            use_synced,
        }
    }

    pub fn from_outcome(ctx: &SyncContext, outcome: &SyncOutcome) -> Self {
        Self::new(ctx.mods_dir(), outcome.use_synced_content)
    }

    pub fn name(&self) -> &'static str {
        "synccraft"
    }

    pub fn mods_dir(&self) -> &Path {
        &self.mods_dir
    }

    pub fn uses_synced_content(&self) -> bool {
        self.use_synced
    }

    /// Ensure the mods directory exists so the loader can watch it.
    pub fn init_mods_dir(&self) -> Result<()> {
        if !self.mods_dir.exists() {
            info!("Creating mods directory {}", self.mods_dir.display());
        }
        fs::create_dir_all(&self.mods_dir).map_err(|e| SyncError::fs(&self.mods_dir, e))
    }

    /// Mod files the host should load; empty unless synced content is in use.
    pub fn scan_mods(&self) -> Result<Vec<PathBuf>> {
        if !self.use_synced {
            debug!("Synced content disabled, offering no mods");
            return Ok(Vec::new());
        }

        let mods: Vec<PathBuf> = scan(&self.mods_dir, false)?
            .into_iter()
            .map(|file: LocalFile| file.path().to_path_buf())
            .collect();
        debug!("Offering {} synced mods from {}", mods.len(), self.mods_dir.display());
        Ok(mods)
    }
}
