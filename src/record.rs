//! Entry codec: one tree node as one self-describing record
//!
//! A [`TreeEntry`] becomes an [`EncodedRecord`] whose payload is always valid
//! UTF-8: text files are embedded verbatim, binary files (and text files that
//! turn out not to be UTF-8) are base-64 encoded. Framings decide how records
//! are laid out in the stream; this module only converts between the two
//! shapes.
//!
//! ```rust
//! use foldsnap::record::{EncodedRecord, RecordKind};
//! use foldsnap::types::{EncodingHint, TreeEntry};
//!
//! let entry = TreeEntry::file("img.bin", vec![0x89, 0x50, 0x4E], EncodingHint::Binary);
//! let record = EncodedRecord::from_entry(&entry);
//! assert_eq!(record.kind, RecordKind::BinaryFile);
//! assert_eq!(record.payload, "iVBO");
//! assert_eq!(record.into_entry()?, entry);
//! # Ok::<(), foldsnap::SnapshotError>(())
//! ```

use crate::error::{Result, SnapshotError};
use crate::types::{EncodingHint, EntryKind, TreeEntry};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Kind of record on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Directory, no payload
    Dir,
    /// File embedded verbatim
    TextFile,
    /// File as base-64
    BinaryFile,
    /// Enumeration error; payload is the message
    Error,
}

/// A record ready to be framed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord {
    /// Relative path, forward-slash separated
    pub path: String,
    /// Record kind
    pub kind: RecordKind,
    /// Text payload: raw text, base-64, error message, or empty
    pub payload: String,
    /// Decoded length of a binary payload, when the framing carries it
    pub original_size: Option<u64>,
}

impl EncodedRecord {
    /// Encode a tree entry
    ///
    /// A file classified as text whose bytes are not UTF-8 is encoded as
    /// binary, so the payload is always text and decodes to the same bytes.
    pub fn from_entry(entry: &TreeEntry) -> Self {
        let path = entry.relative_path.clone();
        match &entry.kind {
            EntryKind::Directory => Self {
                path,
                kind: RecordKind::Dir,
                payload: String::new(),
                original_size: None,
            },
            EntryKind::File { content, encoding } => {
                if *encoding == EncodingHint::Text {
                    if let Ok(text) = std::str::from_utf8(content) {
                        return Self {
                            path,
                            kind: RecordKind::TextFile,
                            payload: text.to_string(),
                            original_size: None,
                        };
                    }
                }
                Self::binary(path, content)
            }
            EntryKind::EnumerationError { message } => Self {
                path,
                kind: RecordKind::Error,
                payload: message.clone(),
                original_size: None,
            },
        }
    }

    /// Encode file content as a binary record regardless of its classification
    pub fn binary(path: impl Into<String>, content: &[u8]) -> Self {
        Self {
            path: path.into(),
            kind: RecordKind::BinaryFile,
            payload: STANDARD.encode(content),
            original_size: Some(content.len() as u64),
        }
    }

    /// Whether the record carries file content
    pub fn is_file(&self) -> bool {
        matches!(self.kind, RecordKind::TextFile | RecordKind::BinaryFile)
    }

    /// Decode back into a tree entry
    ///
    /// # Errors
    ///
    /// [`SnapshotError::ContentDecode`] when a binary payload is not valid
    /// base-64 or decodes to a length other than `original_size`.
    pub fn into_entry(self) -> Result<TreeEntry> {
        match self.kind {
            RecordKind::Dir => Ok(TreeEntry::directory(self.path)),
            RecordKind::TextFile => Ok(TreeEntry::file(
                self.path,
                self.payload.into_bytes(),
                EncodingHint::Text,
            )),
            RecordKind::BinaryFile => {
                let content = decode_base64(&self.payload)
                    .map_err(|e| SnapshotError::content_decode(&self.path, e))?;
                if let Some(expected) = self.original_size {
                    if content.len() as u64 != expected {
                        return Err(SnapshotError::content_decode(
                            &self.path,
                            format!(
                                "decoded {} bytes, expected {}",
                                content.len(),
                                expected
                            ),
                        ));
                    }
                }
                Ok(TreeEntry::file(self.path, content, EncodingHint::Binary))
            }
            RecordKind::Error => Ok(TreeEntry::error(self.path, self.payload)),
        }
    }
}

/// Decode standard base-64, ignoring line breaks inside the payload
pub fn decode_base64(payload: &str) -> std::result::Result<Vec<u8>, String> {
    let compact: String;
    let input = if payload.contains(|c| c == '\n' || c == '\r') {
        compact = payload.chars().filter(|c| !matches!(c, '\n' | '\r')).collect();
        compact.as_str()
    } else {
        payload
    };
    STANDARD
        .decode(input.trim_end())
        .map_err(|e| format!("invalid base64: {}", e))
}
