//! Replaying decoded entries onto a destination directory
//!
//! The [`Restorer`] takes the entries produced by the decoder and applies them
//! in order under a destination root. Every path is passed through
//! [`sanitize_relative_path`] first. Existing files are copied aside into
//! `<root>/<backup_dir_name>/<timestamp>/<path>` before they are overwritten;
//! one timestamp is used for the whole run.
//!
//! A failing entry never stops the run. Its path and error land in
//! [`RestoreResult::failures`] and the next entry is processed.
//!
//! ```rust,no_run
//! use foldsnap::restore::Restorer;
//! use foldsnap::types::{EncodingHint, TreeEntry};
//! use std::path::PathBuf;
//!
//! # fn main() -> foldsnap::Result<()> {
//! let entries = vec![
//!     TreeEntry::directory("empty"),
//!     TreeEntry::file("a.txt", b"hello\n".to_vec(), EncodingHint::Text),
//! ];
//! let result = Restorer::new(PathBuf::from("./out")).restore(&entries)?;
//! assert_eq!(result.files_restored, 1);
//! # Ok(())
//! # }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SnapshotError};
use crate::sanitize::sanitize_relative_path;
use crate::types::{
    EntryKind, ProgressCallback, ProgressInfo, RestoreFailure, RestoreResult, TreeEntry,
};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Default name of the backup directory under the destination root
pub const DEFAULT_BACKUP_DIR: &str = ".foldsnap_backup";

/// Applies decoded entries under a destination root
#[derive(Clone)]
pub struct Restorer {
    root: PathBuf,
    backup_existing: bool,
    backup_dir_name: String,
    clock: Arc<dyn Clock>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Restorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Restorer")
            .field("root", &self.root)
            .field("backup_existing", &self.backup_existing)
            .field("backup_dir_name", &self.backup_dir_name)
            .field("clock", &self.clock)
            .finish()
    }
}

/// State for one restore run
struct RestoreRun<'a> {
    restorer: &'a Restorer,
    result: RestoreResult,
    backup_stamp: Option<String>,
}

impl Restorer {
    /// Create a restorer writing under `root`, with backups enabled
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            backup_existing: true,
            backup_dir_name: DEFAULT_BACKUP_DIR.to_string(),
            clock: Arc::new(SystemClock),
            progress: None,
        }
    }

    /// Copy existing files aside before overwriting them
    pub fn with_backups(mut self, enabled: bool) -> Self {
        self.backup_existing = enabled;
        self
    }

    /// Name of the backup directory created under the root
    pub fn with_backup_dir_name(mut self, name: impl Into<String>) -> Self {
        self.backup_dir_name = name.into();
        self
    }

    /// Time source for backup directory names
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report progress once per entry
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Destination root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply `entries` in order
    ///
    /// # Errors
    ///
    /// Only a destination root that cannot be created is an error. Everything
    /// that goes wrong for a single entry is recorded in the result.
    pub fn restore(&self, entries: &[TreeEntry]) -> Result<RestoreResult> {
        let start = Instant::now();
        info!("Restoring {} entries into {:?}", entries.len(), self.root);

        fs::create_dir_all(&self.root)
            .map_err(|e| SnapshotError::filesystem(&self.root, e))?;

        let mut run = RestoreRun {
            restorer: self,
            result: RestoreResult::default(),
            backup_stamp: None,
        };

        for (i, entry) in entries.iter().enumerate() {
            run.apply(entry);

            if let Some(callback) = &self.progress {
                callback(ProgressInfo {
                    operation: "Restoring".to_string(),
                    current_item: Some(entry.relative_path.clone()),
                    processed: i + 1,
                    total: Some(entries.len()),
                    bytes_processed: run.result.bytes_written,
                    total_bytes: None,
                });
            }
        }

        let mut result = run.result;
        result.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Restored {} files and {} directories in {}ms ({} failures, {} backups)",
            result.files_restored,
            result.directories_created,
            result.duration_ms,
            result.failures.len(),
            result.backups_created
        );
        Ok(result)
    }
}

impl RestoreRun<'_> {
    fn apply(&mut self, entry: &TreeEntry) {
        if let EntryKind::EnumerationError { message } = &entry.kind {
            let line = format!("{}: {}", entry.relative_path, message);
            debug!("Error entry in artifact: {}", line);
            self.result.error_entries.push(line);
            return;
        }

        let outcome = sanitize_relative_path(&entry.relative_path).and_then(|relative| {
            let target = self.restorer.root.join(&relative);
            match &entry.kind {
                EntryKind::Directory => self.restore_directory(&target),
                EntryKind::File { content, .. } => self.restore_file(&relative, &target, content),
                EntryKind::EnumerationError { .. } => Ok(()),
            }
        });

        if let Err(e) = outcome {
            warn!("Failed to restore {}: {}", entry.relative_path, e);
            self.result.failures.push(RestoreFailure {
                path: entry.relative_path.clone(),
                error: e.to_string(),
            });
        }
    }

    fn restore_directory(&mut self, target: &Path) -> Result<()> {
        fs::create_dir_all(target).map_err(|e| SnapshotError::filesystem(target, e))?;
        trace!("Directory ready: {:?}", target);
        self.result.directories_created += 1;
        Ok(())
    }

    fn restore_file(&mut self, relative: &Path, target: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| SnapshotError::filesystem(parent, e))?;
        }

        if target.is_dir() {
            return Err(SnapshotError::filesystem(
                target,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "a directory exists at the file's path",
                ),
            ));
        }

        if self.restorer.backup_existing && target.is_file() {
            self.back_up(relative, target)?;
        }

        fs::write(target, content).map_err(|e| SnapshotError::filesystem(target, e))?;
        trace!("Wrote {} bytes to {:?}", content.len(), target);
        self.result.files_restored += 1;
        self.result.bytes_written += content.len() as u64;
        Ok(())
    }

    fn back_up(&mut self, relative: &Path, target: &Path) -> Result<()> {
        let stamp = self
            .backup_stamp
            .get_or_insert_with(|| self.restorer.clock.backup_timestamp())
            .clone();
        let backup_root = self
            .restorer
            .root
            .join(&self.restorer.backup_dir_name)
            .join(stamp);

        let destination = utils::unique_path(&backup_root.join(relative));
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| SnapshotError::filesystem(parent, e))?;
        }
        fs::copy(target, &destination).map_err(|e| SnapshotError::filesystem(target, e))?;

        debug!("Backed up {:?} to {:?}", target, destination);
        self.result.backups_created += 1;
        self.result.backup_dir = Some(backup_root);
        Ok(())
    }
}
