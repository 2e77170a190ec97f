//! Network transport and download progress.

pub mod fetch;
pub mod progress;
