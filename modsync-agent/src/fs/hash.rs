//! SHA-256 content hashing for local and downloaded files.

use crate::fs::walker::LocalFile;
use crate::utils::errors::{Result, SyncError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// Lowercase hex SHA-256 of a byte buffer.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Lowercase hex SHA-256 of a file, streamed from disk.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hex digests compare case-insensitively.
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Whether `s` looks like a SHA-256 hex digest.
pub fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Hash every file on blocking worker threads, at most `parallelism` at a time.
///
/// Results are memoized inside each [`LocalFile`]; read failures are memoized
/// too and surface later through [`LocalFile::hash`]. Order is preserved.
pub async fn hash_files(files: Vec<LocalFile>, parallelism: usize) -> Result<Vec<LocalFile>> {
    if files.is_empty() {
        return Ok(files);
    }

    let workers = parallelism.clamp(1, files.len());
    let chunk_size = files.len().div_ceil(workers);

    let mut handles = Vec::with_capacity(workers);
    let mut files = files.into_iter().peekable();
    while files.peek().is_some() {
        let chunk: Vec<LocalFile> = files.by_ref().take(chunk_size).collect();
        handles.push(tokio::task::spawn_blocking(move || {
            for file in &chunk {
                let _ = file.hash();
            }
            chunk
        }));
    }

    let mut hashed = Vec::new();
    for handle in handles {
        let chunk = handle
            .await
            .map_err(|e| SyncError::Io(io::Error::other(e)))?;
        hashed.extend(chunk);
    }

    Ok(hashed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::walker::scan;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const HELLO_WORLD: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_bytes() {
        assert_eq!(sha256_bytes(b"hello world"), HELLO_WORLD);
    }

    #[test]
    fn test_sha256_file_matches_bytes() -> io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"hello world")?;
        temp_file.flush()?;

        assert_eq!(sha256_file(temp_file.path())?, HELLO_WORLD);
        Ok(())
    }

    #[test]
    fn test_hashes_match_ignores_case() {
        assert!(hashes_match(HELLO_WORLD, &HELLO_WORLD.to_uppercase()));
        assert!(!hashes_match(HELLO_WORLD, &sha256_bytes(b"other")));
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(HELLO_WORLD));
        assert!(is_sha256_hex(&HELLO_WORLD.to_uppercase()));
        assert!(!is_sha256_hex("abc"));
        assert!(!is_sha256_hex(&"z".repeat(64)));
    }

    #[tokio::test]
    async fn test_hash_files_preserves_order() -> Result<()> {
        let temp_dir = TempDir::new()?;
        for i in 0..7 {
            std::fs::write(temp_dir.path().join(format!("{i}.jar")), format!("mod {i}"))?;
        }

        let files = scan(temp_dir.path(), false)?;
        let names: Vec<String> = files.iter().map(|f| f.relative_path().to_string()).collect();

        let hashed = hash_files(files, 3).await?;
        let hashed_names: Vec<String> = hashed.iter().map(|f| f.relative_path().to_string()).collect();
        assert_eq!(names, hashed_names);

        for file in &hashed {
            let expected = sha256_bytes(std::fs::read(file.path())?.as_slice());
            assert_eq!(file.hash()?, expected);
        }
        Ok(())
    }
}
