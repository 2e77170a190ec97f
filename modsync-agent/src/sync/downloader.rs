//! Plan execution: delete stale files, then download missing entries.
//!
//! Deletions run first and all finish before any download starts. Downloads
//! run on a bounded pool; each one is verified against the manifest hash,
//! written to a temporary `.part` file next to its destination and renamed
//! into place. An existing destination file is never overwritten.

use crate::fs::hash::{hashes_match, sha256_bytes};
use crate::fs::walker::PARTIAL_SUFFIX;
use crate::manifest::{Category, Entry};
use crate::sync::planner::ReconciliationPlan;
use crate::transfer::fetch::Fetch;
use crate::transfer::progress::{format_bytes, ProgressCallback, ProgressTracker};
use crate::utils::errors::{Result, SyncError};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of concurrent downloads per category.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 4;

/// Result of applying one category's plan
#[derive(Debug)]
pub struct ApplyReport {
    pub category: Category,
    pub deleted: usize,
    pub downloaded: usize,
    /// Entries skipped because a file already existed at the destination
    pub skipped_existing: usize,
    pub bytes_downloaded: u64,
    /// Entries that could not be fetched or written, in manifest order
    pub failed: Vec<(Entry, SyncError)>,
    /// Stale files that could not be removed
    pub delete_failures: Vec<(PathBuf, SyncError)>,
    /// Local files left in place without a verified hash
    pub unreadable: Vec<(PathBuf, String)>,
}

impl ApplyReport {
    fn new(category: Category) -> Self {
        Self {
            category,
            deleted: 0,
            downloaded: 0,
            skipped_existing: 0,
            bytes_downloaded: 0,
            failed: Vec::new(),
            delete_failures: Vec::new(),
            unreadable: Vec::new(),
        }
    }

    /// True when every deletion and every fetch succeeded and no local
    /// file was left unverified.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.delete_failures.is_empty() && self.unreadable.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len() + self.delete_failures.len() + self.unreadable.len()
    }
}

enum FetchOutcome {
    Downloaded(u64),
    SkippedExisting,
}

/// Executes reconciliation plans against the local disk
pub struct Downloader {
    fetcher: Arc<dyn Fetch>,
    max_concurrent: usize,
    cancel_token: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl Downloader {
    /// Create a downloader (no cancellation support)
    pub fn new(fetcher: Arc<dyn Fetch>, max_concurrent: usize) -> Self {
        Self {
            fetcher,
            max_concurrent: max_concurrent.max(1),
            cancel_token: CancellationToken::new(),
            progress: None,
        }
    }

    /// Abort pending and in-flight downloads when `cancel_token` fires
    pub fn with_cancel(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Apply `plan` below `root`, creating `root` first if needed.
    ///
    /// Never fails as a whole: every problem is recorded in the report.
    pub async fn apply(&self, category: Category, plan: ReconciliationPlan, root: &Path) -> ApplyReport {
        let mut report = ApplyReport::new(category);
        report.unreadable = plan.unreadable;

        if let Err(e) = tokio::fs::create_dir_all(root).await {
            warn!("Cannot create {} directory {}: {}", category, root.display(), e);
            let cause = e.to_string();
            report.failed = plan
                .to_fetch
                .into_iter()
                .map(|entry| {
                    let err = SyncError::fs(root, std::io::Error::new(e.kind(), cause.clone()));
                    (entry, err)
                })
                .collect();
            return report;
        }

        for file in &plan.to_delete {
            match tokio::fs::remove_file(file.path()).await {
                Ok(()) => {
                    info!("Deleted stale {} file {}", category, file.relative_path());
                    report.deleted += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} already gone", file.path().display());
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to delete {}: {}", file.path().display(), e);
                    report
                        .delete_failures
                        .push((file.path().to_path_buf(), SyncError::fs(file.path(), e)));
                }
            }
        }

        if plan.to_fetch.is_empty() {
            return report;
        }

        let tracker = Arc::new(ProgressTracker::new(
            category,
            plan.to_fetch.len(),
            self.progress.clone(),
        ));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut pending: BTreeMap<usize, Entry> = BTreeMap::new();

        for (index, entry) in plan.to_fetch.into_iter().enumerate() {
            pending.insert(index, entry.clone());

            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let tracker = Arc::clone(&tracker);
            let cancel = self.cancel_token.clone();
            let dest = root.join(entry.local_path());

            tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(SyncError::Cancelled),
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(_permit) => fetch_entry(fetcher.as_ref(), &entry, &dest, &cancel, &tracker).await,
                        Err(_) => Err(SyncError::Cancelled),
                    },
                };

                let bytes = match &result {
                    Ok(FetchOutcome::Downloaded(bytes)) => *bytes,
                    _ => 0,
                };
                tracker.finish_file(bytes);

                (index, result)
            });
        }

        let mut failures: BTreeMap<usize, (Entry, SyncError)> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!("Download task failed to complete: {}", e);
                    continue;
                }
            };
            let Some(entry) = pending.remove(&index) else {
                continue;
            };

            match result {
                Ok(FetchOutcome::Downloaded(bytes)) => {
                    report.downloaded += 1;
                    report.bytes_downloaded += bytes;
                }
                Ok(FetchOutcome::SkippedExisting) => {
                    info!("{} file {} already exists, skipping", category, entry.local_path());
                    report.skipped_existing += 1;
                }
                Err(e) => {
                    warn!("Failed to sync {} file {}: {}", category, entry.local_path(), e);
                    failures.insert(index, (entry, e));
                }
            }
        }

        // Tasks that died without reporting back
        for (index, entry) in pending {
            let error = SyncError::Transport(format!("download of {} did not complete", entry.url()));
            failures.insert(index, (entry, error));
        }
        report.failed = failures.into_values().collect();

        info!(
            "{}: {} downloaded ({}), {} skipped, {} deleted, {} failed in {:?}",
            category,
            report.downloaded,
            format_bytes(report.bytes_downloaded),
            report.skipped_existing,
            report.deleted,
            report.failure_count(),
            tracker.elapsed()
        );

        report
    }
}

async fn fetch_entry(
    fetcher: &dyn Fetch,
    entry: &Entry,
    dest: &Path,
    cancel: &CancellationToken,
    tracker: &ProgressTracker,
) -> Result<FetchOutcome> {
    if exists(dest).await? {
        return Ok(FetchOutcome::SkippedExisting);
    }

    tracker.start_file(entry.file_name());
    info!("Downloading {} from {}", entry.local_path(), entry.url());

    let bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(SyncError::Cancelled),
        fetched = fetcher.fetch(entry.url()) => fetched?,
    };

    verify(entry, bytes.clone()).await?;

    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    if !write_atomic(dest, &bytes).await? {
        return Ok(FetchOutcome::SkippedExisting);
    }

    debug!("Wrote {} ({})", dest.display(), format_bytes(bytes.len() as u64));
    Ok(FetchOutcome::Downloaded(bytes.len() as u64))
}

/// Check the downloaded body against the manifest hash off the async runtime.
async fn verify(entry: &Entry, bytes: Bytes) -> Result<()> {
    let actual = tokio::task::spawn_blocking(move || sha256_bytes(&bytes))
        .await
        .map_err(|e| SyncError::Io(std::io::Error::other(e)))?;

    if !hashes_match(&actual, entry.sha256()) {
        return Err(SyncError::HashMismatch {
            expected: entry.sha256().to_string(),
            actual,
        });
    }
    Ok(())
}

async fn exists(path: &Path) -> Result<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| SyncError::fs(path, e))
}

/// Write `data` to a sibling temp file, then rename it onto `dest`.
///
/// Returns `false` without writing if `dest` appeared in the meantime.
async fn write_atomic(dest: &Path, data: &[u8]) -> Result<bool> {
    let parent = dest.parent().unwrap_or(Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| SyncError::fs(parent, e))?;

    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.{}{}", file_name, uuid::Uuid::new_v4(), PARTIAL_SUFFIX));

    if let Err(e) = tokio::fs::write(&tmp, data).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(SyncError::fs(&tmp, e));
    }

    if exists(dest).await? {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Ok(false);
    }

    if let Err(e) = tokio::fs::rename(&tmp, dest).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(SyncError::fs(dest, e));
    }

    Ok(true)
}
