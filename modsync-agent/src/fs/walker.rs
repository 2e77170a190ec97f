//! Local state scanning.
//!
//! Enumerates the regular files under a category root so the planner can
//! compare them against the manifest. Hashes are computed lazily and memoized.

use crate::fs::hash::sha256_file;
use crate::utils::errors::{Result, SyncError};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// Suffix of in-flight download files; never treated as local content.
pub const PARTIAL_SUFFIX: &str = ".part";

/// A file discovered on disk during a reconciliation pass
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Full path to the file
    path: PathBuf,

    /// Path relative to the category root, `/`-separated
    relative_path: String,

    /// Memoized content hash (or the read error message)
    hash: OnceLock<std::result::Result<String, String>>,
}

impl LocalFile {
    pub fn new(path: PathBuf, relative_path: impl Into<String>) -> Self {
        Self {
            path,
            relative_path: relative_path.into(),
            hash: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// Final path component
    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// SHA-256 of the file contents, computed on first call.
    pub fn hash(&self) -> Result<&str> {
        let cached = self
            .hash
            .get_or_init(|| sha256_file(&self.path).map_err(|e| e.to_string()));

        match cached {
            Ok(hash) => Ok(hash.as_str()),
            Err(message) => Err(SyncError::fs(
                &self.path,
                std::io::Error::other(message.clone()),
            )),
        }
    }
}

/// Enumerate regular files under `root`.
///
/// With `recursive` false only direct children are returned. Directories are
/// never returned. A missing root yields an empty list.
///
/// # Example
/// ```no_run
/// use modsync_agent::fs::walker::scan;
/// use std::path::Path;
///
/// let files = scan(Path::new("synccraft/mods"), false).unwrap();
/// println!("Found {} mods", files.len());
/// ```
pub fn scan(root: &Path, recursive: bool) -> Result<Vec<LocalFile>> {
    scan_with_prefix(root, recursive, "")
}

/// Scan several directories below `base`, non-recursively.
///
/// Each file's relative path is computed from `base`, so `config/a.toml`
/// scanned from `dirs = ["config"]` keeps its `config/` prefix. Duplicate
/// directories are scanned once.
pub fn scan_scoped<I, P>(base: &Path, dirs: I) -> Result<Vec<LocalFile>>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let dirs: BTreeSet<PathBuf> = dirs.into_iter().map(|d| d.as_ref().to_path_buf()).collect();

    let mut files = Vec::new();
    for dir in dirs {
        let prefix = to_slash(&dir);
        files.extend(scan_with_prefix(&base.join(&dir), false, &prefix)?);
    }

    Ok(files)
}

fn scan_with_prefix(root: &Path, recursive: bool, prefix: &str) -> Result<Vec<LocalFile>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            SyncError::fs(path, e.into())
        })?;

        // Skip directories, symlinks and anything else that is not a plain file
        if !entry.file_type().is_file() {
            continue;
        }

        if is_partial_download(&entry.file_name().to_string_lossy()) {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let relative = if prefix.is_empty() {
            to_slash(relative)
        } else {
            format!("{}/{}", prefix, to_slash(relative))
        };

        files.push(LocalFile::new(path, relative));
    }

    Ok(files)
}

fn is_partial_download(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

/// Render a relative path with `/` separators regardless of platform.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
