//! Verbose length-prefixed framing
//!
//! Each record is a separator line, a one-line JSON header and exactly `size`
//! payload bytes:
//!
//! ```text
//! --- entry ---
//! {"path":"a.txt","type":"file","encoding":"utf-8","size":6}
//! hello
//! ```
//!
//! Boundaries come from declared lengths, so file content never needs to be
//! inspected or escaped. Directory and error records carry no payload.

use super::{next_line, Framing, RecordWrite};
use crate::error::Result;
use crate::record::{EncodedRecord, RecordKind};
use crate::types::{DecodeReport, FramingKind, TreeEntry};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::trace;

/// Record separator line, without its newline
pub const SEPARATOR: &str = "--- entry ---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MetaType {
    Dir,
    File,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum MetaEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

/// JSON header line of one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RecordMeta {
    path: String,
    #[serde(rename = "type")]
    kind: MetaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    encoding: Option<MetaEncoding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl RecordMeta {
    fn for_record(record: &EncodedRecord) -> Self {
        let payload_len = Some(record.payload.len() as u64);
        let (kind, encoding, size, message) = match record.kind {
            RecordKind::Dir => (MetaType::Dir, None, None, None),
            RecordKind::TextFile => (MetaType::File, Some(MetaEncoding::Utf8), payload_len, None),
            RecordKind::BinaryFile => {
                (MetaType::File, Some(MetaEncoding::Base64), payload_len, None)
            }
            RecordKind::Error => (MetaType::Error, None, None, Some(record.payload.clone())),
        };
        Self {
            path: record.path.clone(),
            kind,
            encoding,
            size,
            original_size: if record.kind == RecordKind::BinaryFile {
                record.original_size
            } else {
                None
            },
            message,
        }
    }

    fn payload_len(&self) -> usize {
        match self.kind {
            MetaType::File => self.size.unwrap_or(0) as usize,
            MetaType::Dir | MetaType::Error => 0,
        }
    }
}

/// Decoder state, advanced one step at a time
enum ScanState {
    /// Looking for a separator line at this offset
    ScanningForMarker { pos: usize, resyncing: bool },
    /// Header parsed, payload starts at `start`
    AccumulatingPayload { start: usize, meta: RecordMeta },
    Done,
}

/// Separator line, JSON header, fixed-length payload
#[derive(Debug, Clone, Copy, Default)]
pub struct VerboseFraming;

impl Framing for VerboseFraming {
    fn kind(&self) -> FramingKind {
        FramingKind::Verbose
    }

    fn write_record(&self, out: &mut dyn Write, record: &EncodedRecord) -> Result<RecordWrite> {
        let meta = serde_json::to_string(&RecordMeta::for_record(record))?;
        out.write_all(SEPARATOR.as_bytes())?;
        out.write_all(b"\n")?;
        out.write_all(meta.as_bytes())?;
        out.write_all(b"\n")?;

        let mut bytes = (SEPARATOR.len() + meta.len() + 2) as u64;
        if record.is_file() {
            out.write_all(record.payload.as_bytes())?;
            bytes += record.payload.len() as u64;
        }
        Ok(RecordWrite::Written {
            kind: record.kind,
            bytes,
        })
    }

    fn decode(&self, stream: &[u8], report: &mut DecodeReport) -> Vec<TreeEntry> {
        let mut entries = Vec::new();
        let mut state = ScanState::ScanningForMarker {
            pos: 0,
            resyncing: false,
        };
        loop {
            state = match state {
                ScanState::Done => break,
                ScanState::ScanningForMarker { pos, resyncing } => {
                    scan_for_marker(stream, pos, resyncing, report)
                }
                ScanState::AccumulatingPayload { start, meta } => {
                    accumulate_payload(stream, start, meta, report, &mut entries)
                }
            };
        }
        entries
    }
}

fn scan_for_marker(
    stream: &[u8],
    pos: usize,
    resyncing: bool,
    report: &mut DecodeReport,
) -> ScanState {
    let Some((line, next)) = next_line(stream, pos) else {
        return ScanState::Done;
    };
    let at_eof = next.is_none();
    let trimmed = line.trim_ascii();

    if trimmed == SEPARATOR.as_bytes() {
        report.records_seen += 1;
        let Some(meta_start) = next else {
            report.truncated = true;
            report.warn(format!("stream ends after a separator at byte {}", pos));
            return ScanState::Done;
        };
        return match next_line(stream, meta_start) {
            Some((meta_line, Some(payload_start))) => match parse_meta(meta_line) {
                Ok(meta) => ScanState::AccumulatingPayload {
                    start: payload_start,
                    meta,
                },
                Err(reason) => {
                    report.framing_errors += 1;
                    report.warn(format!(
                        "unreadable record header at byte {}: {}",
                        meta_start, reason
                    ));
                    ScanState::ScanningForMarker {
                        pos: payload_start,
                        resyncing: true,
                    }
                }
            },
            _ => {
                report.truncated = true;
                report.warn(format!("record header cut off at byte {}", meta_start));
                ScanState::Done
            }
        };
    }

    if at_eof && !line.is_empty() && SEPARATOR.as_bytes().starts_with(line) {
        report.truncated = true;
        report.warn(format!("separator cut off at byte {}", pos));
        return ScanState::Done;
    }

    let resyncing = if trimmed.is_empty() || resyncing {
        resyncing
    } else {
        report.framing_errors += 1;
        report.warn(format!(
            "unexpected data at byte {}, skipping to the next record",
            pos
        ));
        true
    };

    match next {
        Some(pos) => ScanState::ScanningForMarker { pos, resyncing },
        None => ScanState::Done,
    }
}

fn accumulate_payload(
    stream: &[u8],
    start: usize,
    meta: RecordMeta,
    report: &mut DecodeReport,
    entries: &mut Vec<TreeEntry>,
) -> ScanState {
    let len = meta.payload_len();
    let available = stream.len().saturating_sub(start);
    if len > available {
        report.truncated = true;
        report.warn(format!(
            "{} declares {} bytes but only {} remain",
            meta.path, len, available
        ));
        return ScanState::Done;
    }
    let payload = &stream[start..start + len];
    let next = ScanState::ScanningForMarker {
        pos: start + len,
        resyncing: false,
    };

    let record = match build_record(meta, payload) {
        Ok(record) => record,
        Err((path, reason)) => {
            report.content_errors += 1;
            report.warn(format!("skipping {}: {}", path, reason));
            return next;
        }
    };

    match record.into_entry() {
        Ok(entry) => {
            trace!("decoded {}", entry.relative_path);
            report.recovered += 1;
            if matches!(entry.kind, crate::types::EntryKind::EnumerationError { .. }) {
                report.error_records += 1;
            }
            entries.push(entry);
        }
        Err(e) => {
            report.content_errors += 1;
            report.warn(format!("skipping record: {}", e));
        }
    }
    next
}

fn parse_meta(line: &[u8]) -> std::result::Result<RecordMeta, String> {
    let meta: RecordMeta = serde_json::from_slice(line).map_err(|e| e.to_string())?;
    if meta.path.is_empty() {
        return Err("record has an empty path".to_string());
    }
    Ok(meta)
}

fn build_record(
    meta: RecordMeta,
    payload: &[u8],
) -> std::result::Result<EncodedRecord, (String, String)> {
    let (kind, text) = match meta.kind {
        MetaType::Dir => (RecordKind::Dir, String::new()),
        MetaType::Error => (RecordKind::Error, meta.message.unwrap_or_default()),
        MetaType::File => {
            let text = String::from_utf8(payload.to_vec()).map_err(|e| {
                (
                    meta.path.clone(),
                    format!("payload is not valid UTF-8: {}", e.utf8_error()),
                )
            })?;
            match meta.encoding {
                Some(MetaEncoding::Base64) => (RecordKind::BinaryFile, text),
                Some(MetaEncoding::Utf8) | None => (RecordKind::TextFile, text),
            }
        }
    };
    Ok(EncodedRecord {
        path: meta.path,
        kind,
        payload: text,
        original_size: meta.original_size,
    })
}
