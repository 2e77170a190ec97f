//! Server-declared manifest of the desired file set.
//!
//! The manifest is fetched as `mods.json` from the configured server. It holds
//! the version gates, a generation timestamp and one entry list per category.
//! Parsing also validates the entry lists so that nothing touches the disk
//! when the manifest is ambiguous or points outside the sync roots.

pub mod version;

use crate::fs::hash::is_sha256_hex;
use crate::utils::errors::{Result, SyncError};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path};

/// Manifest schema version this agent understands.
pub const SUPPORTED_MANIFEST_VERSION: u32 = 1;

/// File role; each category is reconciled independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Mod,
    Config,
    Resource,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Mod, Category::Config, Category::Resource];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Mod => "mods",
            Category::Config => "configs",
            Category::Resource => "resources",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the file comes from and what it must hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySource {
    pub url: String,
    pub sha256: String,
}

/// Where the file lands locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Bare file name inside the sync mods directory
    FileName(String),
    /// `/`-separated path relative to the game directory
    RelativePath(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ResourceType {
    Resource,
    Shader,
}

/// Informational fields the server may attach; they never affect syncing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum EntryDetails {
    #[default]
    None,
    Mod {
        modid: Option<String>,
        version: Option<String>,
    },
    Resource {
        resource_type: Option<ResourceType>,
    },
}

/// One desired file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: Category,
    pub source: EntrySource,
    pub locator: Locator,
    pub details: EntryDetails,
}

impl Entry {
    /// A mod entry landing at `<mods dir>/<file_name>`.
    pub fn new_mod(url: impl Into<String>, sha256: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            kind: Category::Mod,
            source: EntrySource {
                url: url.into(),
                sha256: sha256.into(),
            },
            locator: Locator::FileName(file_name.into()),
            details: EntryDetails::None,
        }
    }

    /// A config or resource entry landing at `<game dir>/<path>`.
    pub fn new_relative(
        kind: Category,
        url: impl Into<String>,
        sha256: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source: EntrySource {
                url: url.into(),
                sha256: sha256.into(),
            },
            locator: Locator::RelativePath(path.into()),
            details: EntryDetails::None,
        }
    }

    pub fn url(&self) -> &str {
        &self.source.url
    }

    pub fn sha256(&self) -> &str {
        &self.source.sha256
    }

    /// Path relative to the category root.
    pub fn local_path(&self) -> &str {
        match &self.locator {
            Locator::FileName(name) => name,
            Locator::RelativePath(path) => path,
        }
    }

    pub fn file_name(&self) -> &str {
        let path = self.local_path();
        path.rsplit('/').next().unwrap_or(path)
    }
}

/// Parsed and validated manifest. Immutable for the duration of a sync attempt.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub manifest_version: u32,
    pub server_name: String,
    pub accept_client_mod: String,
    pub accept_client_pack: String,
    pub not_supported_message: Option<String>,
    /// Opaque freshness marker, compared byte-for-byte with the cache
    pub timestamp: String,
    pub force_mods: bool,
    pub force_configs: bool,
    pub force_resources: bool,
    pub mods: Vec<Entry>,
    pub configs: Vec<Entry>,
    pub resources: Vec<Entry>,
}

impl Manifest {
    /// Parse and validate a `mods.json` document.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let raw: RawManifest = serde_json::from_slice(data)?;
        let manifest = raw.into_manifest();
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn entries(&self, category: Category) -> &[Entry] {
        match category {
            Category::Mod => &self.mods,
            Category::Config => &self.configs,
            Category::Resource => &self.resources,
        }
    }

    /// Whether the server asks for force sync of `category`.
    pub fn force(&self, category: Category) -> bool {
        match category {
            Category::Mod => self.force_mods,
            Category::Config => self.force_configs,
            Category::Resource => self.force_resources,
        }
    }

    fn validate(&self) -> Result<()> {
        for category in Category::ALL {
            let entries = self.entries(category);

            if let Some(duplicate) = find_duplicate_path(entries) {
                return Err(SyncError::Config(format!(
                    "{} entry '{}' is declared more than once",
                    category, duplicate
                )));
            }

            for entry in entries {
                validate_entry(entry)?;
            }
        }

        // Configs and resources share the game directory as their root.
        // Each list is already unique, so any collision here crosses categories.
        let mut claimed = HashSet::new();
        for entry in self.configs.iter().chain(&self.resources) {
            if !claimed.insert(entry.local_path()) {
                return Err(SyncError::Config(format!(
                    "'{}' is declared as both a config and a resource",
                    entry.local_path()
                )));
            }
        }
        Ok(())
    }
}

/// First `local_path` declared by more than one entry, if any.
pub fn find_duplicate_path(entries: &[Entry]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(entries.len());
    entries
        .iter()
        .map(Entry::local_path)
        .find(|path| !seen.insert(*path))
}

fn validate_entry(entry: &Entry) -> Result<()> {
    let path = entry.local_path();

    if !is_safe_relative_path(path) {
        return Err(SyncError::Schema(format!(
            "{} entry has unsafe local path '{}'",
            entry.kind, path
        )));
    }

    if let Locator::FileName(name) = &entry.locator {
        if name.contains('/') {
            return Err(SyncError::Schema(format!(
                "mod file name '{}' must not contain a directory",
                name
            )));
        }
    }

    if !is_sha256_hex(entry.sha256()) {
        return Err(SyncError::Schema(format!(
            "{} entry '{}' has invalid sha256 '{}'",
            entry.kind,
            path,
            entry.sha256()
        )));
    }

    if entry.url().trim().is_empty() {
        return Err(SyncError::Schema(format!(
            "{} entry '{}' has no url",
            entry.kind, path
        )));
    }

    Ok(())
}

/// Non-empty, relative, no `..`, no backslashes.
fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.contains('\\')
        && Path::new(path)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Collapse `.` segments, repeated and trailing `/` so equal paths compare equal.
///
/// Paths that would still be unsafe (absolute, `..`, backslashes, nothing
/// left) are returned unchanged for validation to reject.
fn normalize_relative_path(path: &str) -> String {
    if path.starts_with('/') || path.contains('\\') {
        return path.to_string();
    }

    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect();
    if segments.is_empty() {
        return path.to_string();
    }

    segments.join("/")
}

// Wire format

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawManifest {
    manifest_version: u32,
    server_name: String,
    #[serde(default)]
    accept_client_mod: String,
    #[serde(default)]
    accept_client_pack: String,
    #[serde(default)]
    not_supported_message: Option<String>,
    timestamp: String,
    #[serde(default)]
    force_mods: bool,
    #[serde(default)]
    force_configs: bool,
    #[serde(default)]
    force_resources: bool,
    #[serde(default)]
    mods: Vec<RawModEntry>,
    #[serde(default)]
    configs: Vec<RawPathEntry>,
    #[serde(default)]
    resources: Vec<RawPathEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModEntry {
    url: String,
    sha256: String,
    file_name: String,
    #[serde(default)]
    modid: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPathEntry {
    url: String,
    sha256: String,
    local_relative_path: String,
    #[serde(default, rename = "type")]
    resource_type: Option<ResourceType>,
}

impl RawManifest {
    fn into_manifest(self) -> Manifest {
        let mods = self
            .mods
            .into_iter()
            .map(|m| Entry {
                kind: Category::Mod,
                source: EntrySource {
                    url: m.url,
                    sha256: m.sha256,
                },
                locator: Locator::FileName(m.file_name),
                details: EntryDetails::Mod {
                    modid: m.modid,
                    version: m.version,
                },
            })
            .collect();

        Manifest {
            manifest_version: self.manifest_version,
            server_name: self.server_name,
            accept_client_mod: self.accept_client_mod,
            accept_client_pack: self.accept_client_pack,
            not_supported_message: self.not_supported_message,
            timestamp: self.timestamp,
            force_mods: self.force_mods,
            force_configs: self.force_configs,
            force_resources: self.force_resources,
            mods,
            configs: path_entries(Category::Config, self.configs),
            resources: path_entries(Category::Resource, self.resources),
        }
    }
}

fn path_entries(kind: Category, raw: Vec<RawPathEntry>) -> Vec<Entry> {
    raw.into_iter()
        .map(|e| Entry {
            kind,
            source: EntrySource {
                url: e.url,
                sha256: e.sha256,
            },
            locator: Locator::RelativePath(normalize_relative_path(&e.local_relative_path)),
            details: match kind {
                Category::Resource => EntryDetails::Resource {
                    resource_type: e.resource_type,
                },
                _ => EntryDetails::None,
            },
        })
        .collect()
}
