//! Reconciliation planning: diff a category's manifest entries against the
//! files found on disk.
//!
//! A local file satisfies an entry when its path relative to the category
//! root equals the entry's local path and its SHA-256 equals the entry's hash.
//! For mods the relative path is the bare file name. Everything else on disk
//! is stale; stale files are only scheduled for deletion in force mode.

use crate::fs::hash::hashes_match;
use crate::fs::walker::LocalFile;
use crate::manifest::{find_duplicate_path, Entry};
use crate::utils::errors::{Result, SyncError};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// What one category needs to converge. Consumed once by the downloader.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    /// Stale local files (always empty unless force sync)
    pub to_delete: Vec<LocalFile>,

    /// Entries not yet satisfied on disk, in manifest order
    pub to_fetch: Vec<Entry>,

    /// Entries already satisfied locally
    pub satisfied: usize,

    /// Local files that could not be hashed and stay in place, with the reason
    pub unreadable: Vec<(PathBuf, String)>,
}

impl ReconciliationPlan {
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_fetch.is_empty()
    }
}

/// Build the plan for one category.
///
/// Fails with [`SyncError::Config`] when two entries share a local path.
pub fn plan(entries: &[Entry], local: &[LocalFile], force: bool) -> Result<ReconciliationPlan> {
    if let Some(duplicate) = find_duplicate_path(entries) {
        return Err(SyncError::Config(format!(
            "ambiguous manifest: '{}' is declared by more than one entry",
            duplicate
        )));
    }

    let by_path: HashMap<&str, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.local_path(), i))
        .collect();

    let mut satisfied = vec![false; entries.len()];
    let mut plan = ReconciliationPlan::default();

    for file in local {
        let Some(&index) = by_path.get(file.relative_path()) else {
            debug!("{} is not in the manifest", file.relative_path());
            mark_stale(&mut plan, file, force);
            continue;
        };

        match file.hash() {
            Ok(hash) if !satisfied[index] && hashes_match(hash, entries[index].sha256()) => {
                satisfied[index] = true;
            }
            Ok(_) => {
                debug!("{} does not match the manifest hash", file.relative_path());
                mark_stale(&mut plan, file, force);
            }
            Err(e) => {
                warn!("Cannot hash {}: {}", file.path().display(), e);
                if force {
                    plan.to_delete.push(file.clone());
                } else {
                    plan.unreadable.push((file.path().to_path_buf(), e.to_string()));
                }
            }
        }
    }

    plan.satisfied = satisfied.iter().filter(|s| **s).count();
    plan.to_fetch = entries
        .iter()
        .zip(&satisfied)
        .filter(|(_, done)| !**done)
        .map(|(entry, _)| entry.clone())
        .collect();

    Ok(plan)
}

fn mark_stale(plan: &mut ReconciliationPlan, file: &LocalFile, force: bool) {
    if force {
        plan.to_delete.push(file.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::hash::sha256_bytes;
    use crate::fs::walker::scan;
    use crate::manifest::Category;
    use std::fs;
    use tempfile::TempDir;

    fn mod_entry(name: &str, content: &[u8]) -> Entry {
        Entry::new_mod(
            format!("https://cdn.example.com/{}", name),
            sha256_bytes(content),
            name,
        )
    }

    fn local_dir(files: &[(&str, &str)]) -> (TempDir, Vec<LocalFile>) {
        let temp_dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = temp_dir.path().join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, content).unwrap();
        }
        let local = scan(temp_dir.path(), true).unwrap();
        (temp_dir, local)
    }

    fn deleted_names(plan: &ReconciliationPlan) -> Vec<&str> {
        plan.to_delete.iter().map(|f| f.relative_path()).collect()
    }

    #[test]
    fn test_empty_local_fetches_everything() -> Result<()> {
        let entries = vec![mod_entry("a.jar", b"a"), mod_entry("b.jar", b"b")];

        for force in [true, false] {
            let plan = plan(&entries, &[], force)?;
            assert!(plan.to_delete.is_empty());
            assert_eq!(plan.to_fetch, entries);
        }
        Ok(())
    }

    #[test]
    fn test_empty_entries_force_deletes_everything() -> Result<()> {
        let (_dir, local) = local_dir(&[("a.jar", "a"), ("b.jar", "b")]);

        let forced = plan(&[], &local, true)?;
        assert_eq!(deleted_names(&forced), vec!["a.jar", "b.jar"]);
        assert!(forced.to_fetch.is_empty());

        let weak = plan(&[], &local, false)?;
        assert!(weak.is_noop());
        Ok(())
    }

    #[test]
    fn test_weak_mode_never_deletes() -> Result<()> {
        let (_dir, local) = local_dir(&[("a.jar", "old"), ("b.jar", "b"), ("extra.jar", "x")]);
        let entries = vec![mod_entry("a.jar", b"new"), mod_entry("b.jar", b"b")];

        let plan = plan(&entries, &local, false)?;
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.to_fetch, vec![entries[0].clone()]);
        assert_eq!(plan.satisfied, 1);
        Ok(())
    }

    #[test]
    fn test_matching_file_is_neither_fetched_nor_deleted() -> Result<()> {
        let (_dir, local) = local_dir(&[("a.jar", "a")]);
        let entries = vec![mod_entry("a.jar", b"a")];

        let plan = plan(&entries, &local, true)?;
        assert!(plan.is_noop());
        assert_eq!(plan.satisfied, 1);
        Ok(())
    }

    #[test]
    fn test_hash_compare_is_case_insensitive() -> Result<()> {
        let (_dir, local) = local_dir(&[("a.jar", "a")]);
        let entries = vec![Entry::new_mod(
            "https://cdn.example.com/a.jar",
            sha256_bytes(b"a").to_uppercase(),
            "a.jar",
        )];

        assert!(plan(&entries, &local, true)?.is_noop());
        Ok(())
    }

    #[test]
    fn test_force_deletes_unknown_and_stale() -> Result<()> {
        let (_dir, local) = local_dir(&[("a.jar", "old"), ("b.jar", "b")]);
        let entries = vec![mod_entry("a.jar", b"new")];

        let plan = plan(&entries, &local, true)?;
        assert_eq!(deleted_names(&plan), vec!["a.jar", "b.jar"]);
        assert_eq!(plan.to_fetch, entries);
        Ok(())
    }

    #[test]
    fn test_same_content_different_name_does_not_satisfy() -> Result<()> {
        let (_dir, local) = local_dir(&[("renamed.jar", "a")]);
        let entries = vec![mod_entry("a.jar", b"a")];

        let weak = plan(&entries, &local, false)?;
        assert_eq!(weak.satisfied, 0);
        assert_eq!(weak.to_fetch, entries);
        assert!(weak.to_delete.is_empty());
        Ok(())
    }

    #[test]
    fn test_to_fetch_keeps_manifest_order() -> Result<()> {
        let (_dir, local) = local_dir(&[("b.jar", "b")]);
        let entries = vec![
            mod_entry("c.jar", b"c"),
            mod_entry("b.jar", b"b"),
            mod_entry("a.jar", b"a"),
        ];

        let plan = plan(&entries, &local, false)?;
        let names: Vec<&str> = plan.to_fetch.iter().map(|e| e.local_path()).collect();
        assert_eq!(names, vec!["c.jar", "a.jar"]);
        Ok(())
    }

    #[test]
    fn test_relative_paths_match_by_full_path() -> Result<()> {
        let (_dir, local) = local_dir(&[("config/a.toml", "a"), ("other/a.toml", "a")]);
        let entries = vec![Entry::new_relative(
            Category::Config,
            "https://cdn.example.com/a.toml",
            sha256_bytes(b"a"),
            "config/a.toml",
        )];

        let plan = plan(&entries, &local, true)?;
        assert_eq!(plan.satisfied, 1);
        assert_eq!(deleted_names(&plan), vec!["other/a.toml"]);
        Ok(())
    }

    #[test]
    fn test_duplicate_local_path_is_config_error() {
        let entries = vec![mod_entry("a.jar", b"one"), mod_entry("a.jar", b"two")];
        let result = plan(&entries, &[], false);
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_unreadable_file_is_replaced_when_forced() -> Result<()> {
        let missing = LocalFile::new(PathBuf::from("/nonexistent/dir/a.jar"), "a.jar");
        let entries = vec![mod_entry("a.jar", b"a")];

        let plan = plan(&entries, &[missing], true)?;
        assert!(plan.unreadable.is_empty());
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_fetch, entries);
        Ok(())
    }

    #[test]
    fn test_unreadable_file_is_reported_in_weak_mode() -> Result<()> {
        let missing = LocalFile::new(PathBuf::from("/nonexistent/dir/a.jar"), "a.jar");
        let entries = vec![mod_entry("a.jar", b"a")];

        let plan = plan(&entries, &[missing], false)?;
        assert_eq!(plan.unreadable.len(), 1);
        assert_eq!(plan.unreadable[0].0, PathBuf::from("/nonexistent/dir/a.jar"));
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.to_fetch, entries);
        Ok(())
    }
}
