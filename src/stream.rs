//! Stream assembly and decoding
//!
//! [`StreamWriter`] frames tree entries one at a time into any `io::Write`
//! sink, keeping the counts that end up in an [`EncodeSummary`].
//! [`decode_stream`] goes the other way, sniffing the framing from the first
//! bytes.
//!
//! ```rust
//! use foldsnap::stream::{decode_stream, encode_entries};
//! use foldsnap::types::{DecodeReport, EncodingHint, FramingKind, TreeEntry};
//!
//! let entries = vec![
//!     TreeEntry::directory("docs"),
//!     TreeEntry::file("docs/a.md", b"# A\n".to_vec(), EncodingHint::Text),
//! ];
//! let (stream, summary) = encode_entries(&entries, FramingKind::Verbose)?;
//! assert_eq!(summary.records_written(), 2);
//!
//! let mut report = DecodeReport::default();
//! let (decoded, framing) = decode_stream(&stream, &mut report);
//! assert_eq!(decoded, entries);
//! assert_eq!(framing, Some(FramingKind::Verbose));
//! # Ok::<(), foldsnap::SnapshotError>(())
//! ```

use crate::error::Result;
use crate::framing::{self, Framing, RecordWrite};
use crate::record::{EncodedRecord, RecordKind};
use crate::types::{DecodeReport, EncodeSummary, FramingKind, TreeEntry};
use std::io::Write;
use tracing::{trace, warn};

/// Frames entries into a sink as they arrive
pub struct StreamWriter<W: Write> {
    sink: W,
    framing: Box<dyn Framing>,
    summary: EncodeSummary,
}

impl<W: Write> StreamWriter<W> {
    /// Start a stream in the given framing
    pub fn new(sink: W, framing: FramingKind) -> Self {
        Self {
            sink,
            framing: framing::framing_for(framing),
            summary: EncodeSummary::default(),
        }
    }

    /// Frame one entry
    ///
    /// Entries the framing cannot represent are counted as skipped with a
    /// warning; only sink errors are returned.
    pub fn write_entry(&mut self, entry: &TreeEntry) -> Result<()> {
        self.summary.entries += 1;
        self.summary.bytes_in += entry.size();

        let record = EncodedRecord::from_entry(entry);
        match self.framing.write_record(&mut self.sink, &record)? {
            RecordWrite::Written { kind, bytes } => {
                trace!("framed {} ({} bytes)", record.path, bytes);
                self.summary.stream_bytes += bytes;
                match kind {
                    RecordKind::Dir => self.summary.directories += 1,
                    RecordKind::TextFile => self.summary.text_files += 1,
                    RecordKind::BinaryFile => self.summary.binary_files += 1,
                    RecordKind::Error => self.summary.errors += 1,
                }
            }
            RecordWrite::Skipped(reason) => {
                warn!("Skipping {}: {}", record.path, reason);
                self.summary.skipped += 1;
                self.summary.warnings.push(reason);
            }
        }
        Ok(())
    }

    /// Counts so far
    pub fn summary(&self) -> &EncodeSummary {
        &self.summary
    }

    /// Flush the sink and hand it back with the final counts
    pub fn finish(mut self) -> Result<(W, EncodeSummary)> {
        self.sink.flush()?;
        Ok((self.sink, self.summary))
    }
}

/// Frame a list of entries into an in-memory stream
pub fn encode_entries(
    entries: &[TreeEntry],
    framing: FramingKind,
) -> Result<(Vec<u8>, EncodeSummary)> {
    let mut writer = StreamWriter::new(Vec::new(), framing);
    for entry in entries {
        writer.write_entry(entry)?;
    }
    writer.finish()
}

/// Decode a stream of either framing
///
/// Returns the entries and the framing that was detected (`None` for an
/// empty stream).
pub fn decode_stream(
    stream: &[u8],
    report: &mut DecodeReport,
) -> (Vec<TreeEntry>, Option<FramingKind>) {
    match framing::sniff(stream) {
        Some(kind) => {
            let entries = framing::framing_for(kind).decode(stream, report);
            (entries, Some(kind))
        }
        None => (Vec::new(), None),
    }
}
