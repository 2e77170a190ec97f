//! Manifest reconciliation: gate, plan, download, cache.

pub mod cache;
pub mod downloader;
pub mod gate;
pub mod orchestrator;
pub mod planner;

pub use orchestrator::{SyncContext, SyncOrchestrator, SyncOutcome, SyncState};
