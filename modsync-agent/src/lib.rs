//! ModSync Agent Library
//!
//! Keeps a game's mods, configs and resource packs in step with a
//! server-published manifest.

pub mod config;
pub mod daemon;
pub mod fs;
pub mod locator;
pub mod manifest;
pub mod settings;
pub mod sync;
pub mod transfer;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::SyncError;
pub type Result<T> = std::result::Result<T, SyncError>;
