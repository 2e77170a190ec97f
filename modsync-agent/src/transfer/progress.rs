//! Download progress for one category pass.
//!
//! Concurrent download workers share one [`ProgressTracker`]; every change is
//! pushed to an optional host callback (for example a launcher progress
//! window showing "Downloading X, 3 of 10").

use crate::manifest::Category;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Callback receiving a snapshot after every progress change
pub type ProgressCallback = Arc<dyn Fn(&SyncProgress) + Send + Sync>;

/// Point-in-time view of a category's downloads
#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    pub category: Category,

    /// Entries finished (downloaded, skipped or failed)
    pub files_done: usize,

    /// Entries in the fetch plan
    pub total_files: usize,

    /// Bytes written so far
    pub bytes_downloaded: u64,

    /// Most recently started file
    pub current_file: Option<String>,
}

impl SyncProgress {
    pub fn percent_complete(&self) -> f64 {
        if self.total_files == 0 {
            100.0
        } else {
            (self.files_done as f64 / self.total_files as f64) * 100.0
        }
    }

    pub fn is_complete(&self) -> bool {
        self.files_done >= self.total_files
    }
}

/// Shared, thread-safe progress state
pub struct ProgressTracker {
    start_time: Instant,
    state: Mutex<SyncProgress>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(category: Category, total_files: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            start_time: Instant::now(),
            state: Mutex::new(SyncProgress {
                category,
                files_done: 0,
                total_files,
                bytes_downloaded: 0,
                current_file: None,
            }),
            callback,
        }
    }

    /// Record that a download of `name` has started
    pub fn start_file(&self, name: &str) {
        self.update(|p| p.current_file = Some(name.to_string()));
    }

    /// Record a finished entry and the bytes it wrote (0 for skips and failures)
    pub fn finish_file(&self, bytes: u64) {
        self.update(|p| {
            p.files_done += 1;
            p.bytes_downloaded += bytes;
        });
    }

    pub fn snapshot(&self) -> SyncProgress {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn update(&self, f: impl FnOnce(&mut SyncProgress)) {
        let snapshot = {
            let mut state = match self.state.lock() {
                Ok(state) => state,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut state);
            state.clone()
        };

        if let Some(callback) = &self.callback {
            callback(&snapshot);
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    if seconds < 60 {
        format!("{}.{:01}s", seconds, duration.subsec_millis() / 100)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
