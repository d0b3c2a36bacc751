//! Core data types used throughout the foldsnap library
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **Tree state**: [`TreeEntry`], [`EntryKind`], [`EncodingHint`] - one walked node
//! - **Operation results**: [`EncodeSummary`], [`DecodeReport`], [`DecodeOutcome`],
//!   [`RestoreResult`] - explicit counts for every pass
//! - **Configuration**: [`SnapshotConfig`], [`FramingKind`] - operation parameters
//! - **Progress**: [`ProgressInfo`], [`ProgressCallback`]
//!
//! ## Examples
//!
//! ```rust
//! use foldsnap::types::{EncodingHint, EntryKind, TreeEntry};
//!
//! let entry = TreeEntry::file("src/main.rs", b"fn main() {}\n".to_vec(), EncodingHint::Text);
//! assert!(entry.is_file());
//! assert_eq!(entry.content(), Some(&b"fn main() {}\n"[..]));
//!
//! let dir = TreeEntry::directory("src");
//! assert!(matches!(dir.kind, EntryKind::Directory));
//! ```

use crate::artifact::ArtifactLayout;
use crate::classify::ClassifierPolicy;
use crate::compression::{CodecTag, CompressionStats};
use crate::error::{Result, SnapshotError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Whether a file's bytes can be embedded verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingHint {
    /// Safe to embed as text
    Text,
    /// Must be re-encoded into a text-safe alphabet
    Binary,
}

/// What a walked node is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory; carries no payload
    Directory,
    /// A regular file and its full content
    File {
        /// File bytes
        content: Vec<u8>,
        /// Classifier verdict
        encoding: EncodingHint,
    },
    /// The node could not be read during the walk
    EnumerationError {
        /// Error text captured at walk time
        message: String,
    },
}

impl EntryKind {
    /// Short label used in listings
    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Directory => "dir",
            EntryKind::File { .. } => "file",
            EntryKind::EnumerationError { .. } => "error",
        }
    }
}

/// One walked node
///
/// `relative_path` is forward-slash separated, unique within a tree, and
/// never begins with a parent reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Relative path from the snapshot root
    pub relative_path: String,
    /// Node kind and payload
    pub kind: EntryKind,
}

impl TreeEntry {
    /// Create a directory entry
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            relative_path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    /// Create a file entry
    pub fn file(path: impl Into<String>, content: Vec<u8>, encoding: EncodingHint) -> Self {
        Self {
            relative_path: path.into(),
            kind: EntryKind::File { content, encoding },
        }
    }

    /// Create an enumeration error entry
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            relative_path: path.into(),
            kind: EntryKind::EnumerationError {
                message: message.into(),
            },
        }
    }

    /// Whether this is a regular file
    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }

    /// Whether this is a directory
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, EntryKind::Directory)
    }

    /// File content, if this is a file
    pub fn content(&self) -> Option<&[u8]> {
        match &self.kind {
            EntryKind::File { content, .. } => Some(content),
            _ => None,
        }
    }

    /// Payload size in bytes (0 for non-files)
    pub fn size(&self) -> u64 {
        self.content().map(|c| c.len() as u64).unwrap_or(0)
    }
}

/// Record framing used inside the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingKind {
    /// Separator line, JSON metadata line, fixed-length payload
    #[default]
    Verbose,
    /// `\n@path\n` inline markers
    Compact,
}

/// Counts for one encode pass
#[derive(Debug, Clone, Default)]
pub struct EncodeSummary {
    /// Entries produced by the walk
    pub entries: usize,
    /// Directory records written
    pub directories: usize,
    /// Files embedded as text
    pub text_files: usize,
    /// Files re-encoded as base-64
    pub binary_files: usize,
    /// Enumeration error records written
    pub errors: usize,
    /// Entries the framing could not represent
    pub skipped: usize,
    /// Total file bytes read from the source
    pub bytes_in: u64,
    /// Size of the assembled stream
    pub stream_bytes: u64,
    /// Size of the final artifact
    pub artifact_bytes: u64,
    /// Codec chosen, when compressed
    pub codec: Option<CodecTag>,
    /// Compression details, when compressed
    pub compression: Option<CompressionStats>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
    /// Non-fatal problems
    pub warnings: Vec<String>,
}

impl EncodeSummary {
    /// Records that made it into the stream
    pub fn records_written(&self) -> usize {
        self.directories + self.text_files + self.binary_files + self.errors
    }
}

/// Counts for one decode pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    /// Candidate records encountered
    pub records_seen: usize,
    /// Records decoded into entries
    pub recovered: usize,
    /// Enumeration error records among the recovered ones
    pub error_records: usize,
    /// Unparsable record headers skipped by resync
    pub framing_errors: usize,
    /// Records dropped because their payload was invalid
    pub content_errors: usize,
    /// Decoding stopped early at a cut-off record
    pub truncated: bool,
    /// Human-readable problems, in stream order
    pub warnings: Vec<String>,
}

impl DecodeReport {
    /// Records that were seen but not recovered
    pub fn failed(&self) -> usize {
        self.framing_errors + self.content_errors
    }

    /// Whether the stream decoded without any loss
    pub fn is_clean(&self) -> bool {
        !self.truncated && self.failed() == 0
    }

    pub(crate) fn warn(&mut self, msg: String) {
        tracing::warn!("{}", msg);
        self.warnings.push(msg);
    }
}

/// Decoded entries plus the report describing how they were obtained
#[derive(Debug, Clone, Default)]
pub struct DecodeOutcome {
    /// Entries in stream order
    pub entries: Vec<TreeEntry>,
    /// Counts and warnings
    pub report: DecodeReport,
    /// Codec that wrapped the stream, if any
    pub codec: Option<CodecTag>,
    /// Layout the artifact was read as
    pub layout: ArtifactLayout,
    /// Record framing of the stream, if one was found
    pub framing: Option<FramingKind>,
}

/// One entry the restorer could not apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreFailure {
    /// Path as recorded in the stream
    pub path: String,
    /// Error text
    pub error: String,
}

/// Result of a restore operation
#[derive(Debug, Clone, Default)]
pub struct RestoreResult {
    /// Files written
    pub files_restored: usize,
    /// Directories created or already present
    pub directories_created: usize,
    /// Existing files copied aside before overwrite
    pub backups_created: usize,
    /// Enumeration error records surfaced as report lines
    pub error_entries: Vec<String>,
    /// Per-entry failures
    pub failures: Vec<RestoreFailure>,
    /// Total bytes written
    pub bytes_written: u64,
    /// Directory holding this run's backups, if any were made
    pub backup_dir: Option<PathBuf>,
    /// Decode counts for the artifact that was restored
    pub decode: DecodeReport,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

impl RestoreResult {
    /// Entries applied successfully
    pub fn succeeded(&self) -> usize {
        self.files_restored + self.directories_created
    }

    /// Entries processed (applied, failed or reported)
    pub fn processed(&self) -> usize {
        self.succeeded() + self.failures.len() + self.error_entries.len()
    }
}

/// Progress callback for long-running operations
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation being performed
    pub operation: String,
    /// Current item being processed
    pub current_item: Option<String>,
    /// Items processed so far
    pub processed: usize,
    /// Total items to process (if known)
    pub total: Option<usize>,
    /// Bytes processed so far
    pub bytes_processed: u64,
    /// Total bytes to process (if known)
    pub total_bytes: Option<u64>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        match self.total {
            Some(total) if total > 0 => Some((self.processed as f32 / total as f32) * 100.0),
            _ => None,
        }
    }
}

/// Snapshot configuration
///
/// Every field has a default, so a JSON file only needs the keys it changes.
///
/// ```rust
/// use foldsnap::types::{FramingKind, SnapshotConfig};
///
/// let config: SnapshotConfig = serde_json::from_str(r#"{"compress": true}"#).unwrap();
/// assert!(config.compress);
/// assert_eq!(config.framing, FramingKind::Verbose);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Wrap the stream in the compression dispatcher
    pub compress: bool,
    /// Record framing for new artifacts
    pub framing: FramingKind,
    /// Streams smaller than this skip the codec race
    pub race_threshold: usize,
    /// Glob patterns excluded from the walk
    pub exclude_patterns: Vec<String>,
    /// Maximum file size to pack (0 = unlimited)
    pub max_file_size: u64,
    /// Whether to follow symbolic links during the walk
    pub follow_symlinks: bool,
    /// Text/binary classification thresholds
    pub classifier: ClassifierPolicy,
    /// Copy existing files aside before overwriting them on restore
    pub backup_existing: bool,
    /// Backup directory name, created under the restore destination
    pub backup_dir_name: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            compress: false,
            framing: FramingKind::Verbose,
            race_threshold: 1024,
            exclude_patterns: Vec::new(),
            max_file_size: 0,
            follow_symlinks: false,
            classifier: ClassifierPolicy::default(),
            backup_existing: true,
            backup_dir_name: ".foldsnap_backup".to_string(),
        }
    }
}

impl SnapshotConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: SnapshotConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        crate::utils::atomic_write(path, json.as_bytes())
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.backup_dir_name.is_empty()
            || self.backup_dir_name.contains(|c| c == '/' || c == '\\')
            || self.backup_dir_name == "."
            || self.backup_dir_name == ".."
        {
            return Err(SnapshotError::InvalidConfiguration(format!(
                "backup_dir_name must be a single path segment, got {:?}",
                self.backup_dir_name
            )));
        }
        self.classifier.validate()
    }
}
