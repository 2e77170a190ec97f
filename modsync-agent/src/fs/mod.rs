//! File system helpers: local scanning and content hashing.

pub mod hash;
pub mod walker;
