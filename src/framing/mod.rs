//! Record framings
//!
//! A framing lays [`EncodedRecord`]s out one after another in a stream and
//! finds them again. Two are supported behind the [`Framing`] trait:
//!
//! - [`verbose`]: separator line, JSON header, fixed-length payload (default)
//! - [`compact`]: `\n@path\n` inline markers, kept for older artifacts
//!
//! [`legacy`] reads the sectioned text layout of the earliest artifacts; it
//! has no writer.

pub mod compact;
pub mod legacy;
pub mod verbose;

use crate::error::Result;
use crate::record::{EncodedRecord, RecordKind};
use crate::types::{DecodeReport, FramingKind, TreeEntry};
use std::io::Write;

pub use compact::CompactFraming;
pub use verbose::VerboseFraming;

/// What happened to one record handed to a framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordWrite {
    /// Written; `kind` may differ from the input when text had to be escaped
    Written {
        /// Kind actually written
        kind: RecordKind,
        /// Bytes added to the stream
        bytes: u64,
    },
    /// The framing cannot represent this record
    Skipped(String),
}

/// A record layout inside a stream
pub trait Framing: std::fmt::Debug + Send + Sync {
    /// Which framing this is
    fn kind(&self) -> FramingKind;

    /// Append one record to `out`
    fn write_record(&self, out: &mut dyn Write, record: &EncodedRecord) -> Result<RecordWrite>;

    /// Decode every record in `stream`
    ///
    /// Never fails: damaged records are counted in `report` and skipped, and
    /// a cut-off stream sets `report.truncated`.
    fn decode(&self, stream: &[u8], report: &mut DecodeReport) -> Vec<TreeEntry>;
}

/// The framing implementation for a kind
pub fn framing_for(kind: FramingKind) -> Box<dyn Framing> {
    match kind {
        FramingKind::Verbose => Box::new(VerboseFraming),
        FramingKind::Compact => Box::new(CompactFraming),
    }
}

/// Guess the framing of a stream from its first bytes
///
/// Returns `None` for an empty or whitespace-only stream.
pub fn sniff(stream: &[u8]) -> Option<FramingKind> {
    let start = stream.iter().position(|b| !b.is_ascii_whitespace())?;
    let rest = &stream[start..];
    if rest.starts_with(b"@") || rest.starts_with(b"!") {
        Some(FramingKind::Compact)
    } else {
        Some(FramingKind::Verbose)
    }
}

/// The line starting at `pos`, without its `\n`, and where the next one starts
///
/// Returns `None` once `pos` is past the end. The second element is `None`
/// when the line runs to the end of the stream without a newline.
pub(crate) fn next_line(stream: &[u8], pos: usize) -> Option<(&[u8], Option<usize>)> {
    if pos >= stream.len() {
        return None;
    }
    let rest = &stream[pos..];
    match rest.iter().position(|&b| b == b'\n') {
        Some(i) => Some((&rest[..i], Some(pos + i + 1))),
        None => Some((rest, None)),
    }
}
