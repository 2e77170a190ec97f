//! Sync orchestrator - sequences one sync attempt end to end.
//!
//! ```text
//! Start -> ManifestFetched -> VersionChecked -> CacheHit -> Skipped
//!                                            -> CacheMiss -> Reconciling(mods, configs, resources)
//!                                                         -> CacheCommitted -> Converged
//!                                                         -> Incomplete
//! any of ManifestFetched / VersionChecked / Reconciling -> Aborted(reason)
//! ```
//!
//! No file is touched before the manifest is fetched, parsed, validated and
//! accepted by the version gate. The cache is committed once, after every
//! category finished cleanly.

use crate::config::PerformanceConfig;
use crate::fs::hash::hash_files;
use crate::fs::walker::{scan, scan_scoped, LocalFile};
use crate::manifest::{Category, Entry, Manifest};
use crate::settings::{Role, Settings, SyncSettings};
use crate::sync::cache::SyncCache;
use crate::sync::downloader::{ApplyReport, Downloader};
use crate::sync::gate::{self, GateDecision, GateRejection};
use crate::sync::planner;
use crate::transfer::fetch::Fetch;
use crate::transfer::progress::{format_duration, ProgressCallback};
use crate::utils::errors::{Result, SyncError};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Subdirectory of the sync directory holding synced mods.
pub const MODS_DIR: &str = "mods";

/// Everything one sync attempt needs, built once and passed down.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub game_dir: PathBuf,
    pub sync_dir: PathBuf,
    pub settings: SyncSettings,
    pub role: Role,
    /// Version of this agent as checked against `acceptClientMod`
    pub client_version: String,
    pub performance: PerformanceConfig,
}

impl SyncContext {
    /// Load settings from `game_dir` and assemble the context.
    pub fn load(
        game_dir: &Path,
        role: Role,
        client_version: impl Into<String>,
        performance: PerformanceConfig,
    ) -> Result<Self> {
        let settings = Settings::load(game_dir, role)?;
        Ok(Self {
            game_dir: game_dir.to_path_buf(),
            sync_dir: settings.sync_dir(game_dir),
            settings: settings.sync,
            role,
            client_version: client_version.into(),
            performance,
        })
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.sync_dir.join(MODS_DIR)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Fetch failed or the body did not parse
    ManifestUnavailable(String),
    /// Manifest parsed but is ambiguous or unsafe
    InvalidManifest(String),
    Rejected(GateRejection),
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::ManifestUnavailable(e) => write!(f, "manifest unavailable: {}", e),
            AbortReason::InvalidManifest(e) => write!(f, "invalid manifest: {}", e),
            AbortReason::Rejected(r) => write!(f, "rejected: {}", r),
            AbortReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Start,
    ManifestFetched,
    VersionChecked,
    CacheHit,
    CacheMiss,
    Reconciling(Category),
    CacheCommitted,
    /// Every category converged; synced content is used
    Converged,
    /// Cache was current; synced content is used as-is
    Skipped,
    /// Some files failed; local state is inconsistent with the manifest
    Incomplete,
    Aborted(AbortReason),
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Converged | SyncState::Skipped | SyncState::Incomplete | SyncState::Aborted(_)
        )
    }
}

#[derive(Debug)]
pub enum CategoryStatus {
    Applied(ApplyReport),
    Skipped(&'static str),
    Failed(SyncError),
}

#[derive(Debug)]
pub struct CategoryOutcome {
    pub category: Category,
    /// Entries already satisfied before downloading
    pub satisfied: usize,
    pub status: CategoryStatus,
}

impl CategoryOutcome {
    pub fn is_clean(&self) -> bool {
        match &self.status {
            CategoryStatus::Applied(report) => report.is_clean(),
            CategoryStatus::Skipped(_) => true,
            CategoryStatus::Failed(_) => false,
        }
    }
}

/// Result of one sync attempt
#[derive(Debug)]
pub struct SyncOutcome {
    /// Terminal state
    pub state: SyncState,
    /// Every state visited, in order
    pub history: Vec<SyncState>,
    /// Whether the host should load the synced content
    pub use_synced_content: bool,
    pub categories: Vec<CategoryOutcome>,
    pub manifest_timestamp: Option<String>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
}

impl SyncOutcome {
    /// Message meant for the player, if the server rejected this client.
    pub fn user_message(&self) -> Option<String> {
        match &self.state {
            SyncState::Aborted(AbortReason::Rejected(rejection)) => Some(rejection.to_string()),
            _ => None,
        }
    }

    pub fn category(&self, category: Category) -> Option<&CategoryOutcome> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// Tracks state transitions for one attempt.
struct Run {
    started: Instant,
    history: Vec<SyncState>,
    categories: Vec<CategoryOutcome>,
    manifest_timestamp: Option<String>,
}

impl Run {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            history: vec![SyncState::Start],
            categories: Vec::new(),
            manifest_timestamp: None,
        }
    }

    fn advance(&mut self, next: SyncState) {
        debug!("Sync state: {:?} -> {:?}", self.history.last(), next);
        self.history.push(next);
    }

    fn finish(mut self, terminal: SyncState) -> SyncOutcome {
        self.advance(terminal.clone());
        let use_synced_content = matches!(terminal, SyncState::Converged | SyncState::Skipped);
        let duration = self.started.elapsed();

        match &terminal {
            SyncState::Aborted(reason) => warn!("Sync aborted ({}), using existing local files", reason),
            SyncState::Incomplete => warn!(
                "Sync incomplete after {}, synced content will not be used",
                format_duration(duration)
            ),
            _ => info!("Sync finished: {:?} in {}", terminal, format_duration(duration)),
        }

        SyncOutcome {
            state: terminal,
            history: self.history,
            use_synced_content,
            categories: self.categories,
            manifest_timestamp: self.manifest_timestamp,
            finished_at: Utc::now(),
            duration,
        }
    }
}

/// Runs sync attempts for one game directory
pub struct SyncOrchestrator {
    ctx: SyncContext,
    fetcher: Arc<dyn Fetch>,
    cancel_token: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl SyncOrchestrator {
    pub fn new(ctx: SyncContext, fetcher: Arc<dyn Fetch>) -> Self {
        Self {
            ctx,
            fetcher,
            cancel_token: CancellationToken::new(),
            progress: None,
        }
    }

    /// Allow the attempt to be abandoned between categories and mid-download
    pub fn with_cancel(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Run one complete sync attempt. Never fails; see [`SyncOutcome::state`].
    pub async fn run(&self) -> SyncOutcome {
        let mut run = Run::new();

        let url = self.ctx.settings.manifest_url();
        info!("Fetching manifest from {}", url);

        let manifest = match self.fetch_manifest(&url).await {
            Ok(manifest) => manifest,
            Err(SyncError::Cancelled) => return run.finish(SyncState::Aborted(AbortReason::Cancelled)),
            Err(e @ (SyncError::Config(_) | SyncError::Schema(_))) => {
                error!("Manifest from {} is invalid: {}", url, e);
                return run.finish(SyncState::Aborted(AbortReason::InvalidManifest(e.to_string())));
            }
            Err(e) => {
                warn!("Cannot load manifest from {}: {}", url, e);
                return run.finish(SyncState::Aborted(AbortReason::ManifestUnavailable(e.to_string())));
            }
        };
        run.manifest_timestamp = Some(manifest.timestamp.clone());
        run.advance(SyncState::ManifestFetched);

        if let GateDecision::Reject(rejection) =
            gate::evaluate(&manifest, &self.ctx.settings, &self.ctx.client_version)
        {
            error!("Manifest rejected: {}", rejection);
            return run.finish(SyncState::Aborted(AbortReason::Rejected(rejection)));
        }
        run.advance(SyncState::VersionChecked);

        let cache = SyncCache::in_dir(&self.ctx.sync_dir);
        if cache.is_current(&manifest.timestamp) {
            info!("Manifest {} already applied, skipping sync", manifest.timestamp);
            run.advance(SyncState::CacheHit);
            return run.finish(SyncState::Skipped);
        }
        run.advance(SyncState::CacheMiss);

        // Until this pass completes, a previous commit no longer describes the disk
        if let Err(e) = cache.invalidate() {
            warn!("Cannot clear sync cache: {}", e);
        }

        let downloader = self.downloader();
        for category in Category::ALL {
            if self.cancel_token.is_cancelled() {
                return run.finish(SyncState::Aborted(AbortReason::Cancelled));
            }

            if let Some(reason) = self.skip_reason(category) {
                info!("Skipping {}: {}", category, reason);
                run.categories.push(CategoryOutcome {
                    category,
                    satisfied: 0,
                    status: CategoryStatus::Skipped(reason),
                });
                continue;
            }

            run.advance(SyncState::Reconciling(category));
            let outcome = self.reconcile(category, &manifest, &downloader).await;
            run.categories.push(outcome);
        }

        if self.cancel_token.is_cancelled() {
            return run.finish(SyncState::Aborted(AbortReason::Cancelled));
        }

        if !run.categories.iter().all(CategoryOutcome::is_clean) {
            return run.finish(SyncState::Incomplete);
        }

        match cache.commit(&manifest.timestamp) {
            Ok(()) => run.advance(SyncState::CacheCommitted),
            Err(e) => warn!("Cannot write sync cache, next start will re-check: {}", e),
        }

        run.finish(SyncState::Converged)
    }

    async fn fetch_manifest(&self, url: &str) -> Result<Manifest> {
        let body = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => return Err(SyncError::Cancelled),
            body = self.fetcher.fetch(url) => body?,
        };
        Manifest::parse(&body)
    }

    fn downloader(&self) -> Downloader {
        let downloader = Downloader::new(
            Arc::clone(&self.fetcher),
            self.ctx.performance.download_parallelism(),
        )
        .with_cancel(self.cancel_token.clone());

        match &self.progress {
            Some(callback) => downloader.with_progress(Arc::clone(callback)),
            None => downloader,
        }
    }

    fn skip_reason(&self, category: Category) -> Option<&'static str> {
        match category {
            Category::Config if !self.ctx.settings.sync_config => Some("config sync disabled in settings"),
            Category::Resource if self.ctx.role == Role::Server => Some("resources are not synced on servers"),
            _ => None,
        }
    }

    /// Root that a category's local paths are relative to.
    fn category_root(&self, category: Category) -> PathBuf {
        match category {
            Category::Mod => self.ctx.mods_dir(),
            Category::Config | Category::Resource => self.ctx.game_dir.clone(),
        }
    }

    async fn reconcile(&self, category: Category, manifest: &Manifest, downloader: &Downloader) -> CategoryOutcome {
        let entries = manifest.entries(category);
        let root = self.category_root(category);
        let force = manifest.force(category) && !self.ctx.settings.weak_sync;

        info!(
            "Checking {} ({} entries, {} sync)",
            category,
            entries.len(),
            if force { "force" } else { "weak" }
        );

        let planned = async {
            let protected = declared_elsewhere(manifest, category);
            let local = local_files(category, &root, entries, &protected)?;
            let local = hash_files(local, self.ctx.performance.hash_parallelism()).await?;
            planner::plan(entries, &local, force)
        }
        .await;

        let plan = match planned {
            Ok(plan) => plan,
            Err(e) => {
                error!("Cannot plan {}: {}", category, e);
                return CategoryOutcome {
                    category,
                    satisfied: 0,
                    status: CategoryStatus::Failed(e),
                };
            }
        };

        let satisfied = plan.satisfied;
        if plan.is_noop() {
            info!("{} are up to date ({} files)", category, satisfied);
        }

        let report = downloader.apply(category, plan, &root).await;
        CategoryOutcome {
            category,
            satisfied,
            status: CategoryStatus::Applied(report),
        }
    }
}

/// Paths under the same root that another category declares.
fn declared_elsewhere(manifest: &Manifest, category: Category) -> HashSet<&str> {
    if category == Category::Mod {
        return HashSet::new();
    }

    Category::ALL
        .into_iter()
        .filter(|other| *other != category && *other != Category::Mod)
        .flat_map(|other| manifest.entries(other).iter().map(Entry::local_path))
        .collect()
}

/// Local candidates for a category.
///
/// Mods: every file directly in the mods directory. Configs and resources:
/// files directly inside each directory an entry lives in, plus declared
/// files at the game directory's top level. The game directory itself is
/// never enumerated. Files in `protected` belong to another category and
/// are left out.
fn local_files(
    category: Category,
    root: &Path,
    entries: &[Entry],
    protected: &HashSet<&str>,
) -> Result<Vec<LocalFile>> {
    if category == Category::Mod {
        return scan(root, false);
    }

    let mut dirs = BTreeSet::new();
    let mut top_level = Vec::new();
    for entry in entries {
        match Path::new(entry.local_path()).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                dirs.insert(parent.to_path_buf());
            }
            _ => top_level.push(entry.local_path()),
        }
    }

    let mut files = scan_scoped(root, &dirs)?;
    for name in top_level {
        let path = root.join(name);
        if path.is_file() {
            files.push(LocalFile::new(path, name));
        }
    }
    files.retain(|file| !protected.contains(file.relative_path()));

    Ok(files)
}
