//! Error types for the foldsnap library
//!
//! Errors fall into two groups. Some are fatal for the operation that raised
//! them (an unrecognized artifact header, an unknown codec tag, an unreadable
//! root). Others describe a single damaged record or a single failed write;
//! the decoder and the restorer record those and keep going, so they normally
//! surface as counts and warning lines rather than as `Err` values.
//!
//! Unreadable source nodes, unmatched record boundaries and cut-off streams
//! have no variant here at all. They only ever appear as error entries and as
//! the `framing_errors` and `truncated` fields of [`crate::DecodeReport`].

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the foldsnap library
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Main error type for all foldsnap operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A record's payload could not be decoded
    #[error("Content decode error for {path}: {reason}")]
    ContentDecode {
        /// Path of the damaged record
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Restore-time create/write failure
    #[error("Filesystem error at {path:?}: {source}")]
    Filesystem {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Compression container names a codec we do not know
    #[error("Unsupported codec tag: {0:?}")]
    UnsupportedCodec(String),

    /// The artifact header matches none of the known layouts
    #[error("Unrecognized artifact format: {0}")]
    UnrecognizedFormat(String),

    /// Compression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Decompression errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// A path that cannot be represented or restored safely
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath {
        /// Offending path as found in the stream
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// File too large for configured limits
    #[error("File too large: {path:?} ({size} bytes exceeds limit of {limit} bytes)")]
    FileTooLarge {
        /// Path to the file
        path: PathBuf,
        /// Actual file size
        size: u64,
        /// Configured size limit
        limit: u64,
    },

    /// Unsupported file type (symlinks, sockets, devices)
    #[error("Unsupported file type: {path:?}")]
    UnsupportedFileType {
        /// Path to the unsupported file
        path: PathBuf,
    },

    /// Pattern parsing error
    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Snapshot source does not exist
    #[error("Source not found: {0:?}")]
    SourceNotFound(PathBuf),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SnapshotError {
    /// Create a content decode error for a record
    pub fn content_decode(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SnapshotError::ContentDecode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a filesystem error bound to a destination path
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid path error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SnapshotError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a compression error with a custom message
    pub fn compression(msg: impl Into<String>) -> Self {
        SnapshotError::Compression(msg.into())
    }

    /// Create a decompression error with a custom message
    pub fn decompression(msg: impl Into<String>) -> Self {
        SnapshotError::Decompression(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SnapshotError::Internal(msg.into())
    }

    /// Check if this error only affects a single record or entry
    ///
    /// Recoverable errors are counted and reported; the surrounding decode or
    /// restore pass continues past them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SnapshotError::ContentDecode { .. }
                | SnapshotError::Filesystem { .. }
                | SnapshotError::InvalidPath { .. }
                | SnapshotError::FileTooLarge { .. }
                | SnapshotError::UnsupportedFileType { .. }
        )
    }

    /// Check if this error indicates a damaged artifact
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            SnapshotError::ContentDecode { .. } | SnapshotError::Decompression(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            SnapshotError::UnsupportedCodec(tag) => {
                format!(
                    "The artifact was compressed with '{}', which this version cannot decode. \
                     Nothing can be recovered without that codec.",
                    tag
                )
            }
            SnapshotError::UnrecognizedFormat(_) => {
                "The input does not look like a snapshot artifact. \
                 Check that the whole file was copied, including its first line."
                    .to_string()
            }
            SnapshotError::SourceNotFound(path) => {
                format!("Path {:?} does not exist.", path)
            }
            SnapshotError::FileTooLarge { path, size, limit } => {
                format!(
                    "File {:?} is too large ({} bytes). Maximum allowed size is {} bytes. \
                     Consider raising max_file_size or excluding the file.",
                    path, size, limit
                )
            }
            _ => self.to_string(),
        }
    }
}
