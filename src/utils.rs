//! Utility functions for foldsnap
//!
//! Small helpers shared by the walker, the facade and the verifier:
//!
//! - Hashing (SHA-256, hex encoded), with the trailing-newline rule for text
//! - Path manipulation: relative paths, forward-slash rendering, unique
//!   output names
//! - Atomic file writing
//! - Human-readable byte sizes
//!
//! ## Example Usage
//!
//! ```rust
//! use foldsnap::utils::{format_bytes, hash_data, hash_text};
//!
//! assert_eq!(format_bytes(1536), "1.50 KB");
//! assert_eq!(hash_data(b"abc").len(), 64);
//! assert_eq!(hash_text(b"hello\n"), hash_text(b"hello"));
//! ```

use crate::error::{Result, SnapshotError};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Compute the SHA-256 hash of in-memory data
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash used when comparing text, ignoring one trailing newline
///
/// Two texts that differ only in a single final `\n` hash the same.
pub fn hash_text(data: &[u8]) -> String {
    hash_data(data.strip_suffix(b"\n").unwrap_or(data))
}

/// Convert an absolute path to a path relative to `base`
///
/// Tries a lexical strip first so symbolic links keep their own path, and
/// falls back to comparing canonical forms.
pub fn make_relative(path: &Path, base: &Path) -> Result<PathBuf> {
    if let Ok(relative) = path.strip_prefix(base) {
        return Ok(relative.to_path_buf());
    }

    let path_canon = path.canonicalize()?;
    let base_canon = base.canonicalize()?;

    path_canon
        .strip_prefix(&base_canon)
        .map(|p| p.to_path_buf())
        .map_err(|_| {
            SnapshotError::internal(format!(
                "Path {:?} is not relative to {:?}",
                path_canon, base_canon
            ))
        })
}

/// Render a relative path with forward slashes
///
/// Only normal components are kept, so the result never contains `.` or a
/// parent reference.
pub fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Format bytes in human-readable form using 1024-based units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write
///
/// Writes to a temporary file in the target's directory, syncs it, then
/// renames it over the target, so readers never see a partial file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| SnapshotError::filesystem(path, e.error))?;
    Ok(())
}

/// First free variant of `path`
///
/// Returns `path` itself if nothing exists there, otherwise `stem_1.ext`,
/// `stem_2.ext` and so on.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 1u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Output file name for a snapshot of `name`
pub fn snapshot_file_name(name: &str, compressed: bool) -> String {
    if compressed {
        format!("compressed_snapshot_{}.txt", name)
    } else {
        format!("snapshot_{}.txt", name)
    }
}
