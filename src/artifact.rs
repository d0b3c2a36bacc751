//! Artifact layout: header line, framing, optional compression container
//!
//! Current artifacts are one of:
//!
//! ```text
//! UNCOMPRESSED
//! <stream>
//! ```
//!
//! ```text
//! COMPRESSED
//! <codec-tag>:<payload>
//! ```
//!
//! Older layouts are recognized from their first line and read through the
//! same entry point:
//!
//! - a bare verbose stream starting with `--- entry ---`
//! - JSON metadata lines, `---SNAPSHOT_METADATA_END---`, then base-85 XZ
//! - `=== SNAPSHOT_FORMAT: ... ===` sectioned text (see [`crate::framing::legacy`])
//!
//! An input that is a strict prefix of a known header decodes to a truncated,
//! empty result rather than an error.

use crate::compression::{CodecTag, CompressedPayload, CompressionDispatcher};
use crate::error::{Result, SnapshotError};
use crate::framing::{legacy, verbose};
use crate::stream::decode_stream;
use crate::types::{DecodeOutcome, DecodeReport, FramingKind};
use std::io::Write;
use tracing::{debug, info};

/// Header line of an uncompressed artifact
pub const UNCOMPRESSED_HEADER: &str = "UNCOMPRESSED";

/// Header line of a compressed artifact
pub const COMPRESSED_HEADER: &str = "COMPRESSED";

/// Line ending the metadata block of older compressed artifacts
pub const METADATA_END: &str = "---SNAPSHOT_METADATA_END---";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Which layout an artifact was read as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactLayout {
    /// `UNCOMPRESSED` header
    #[default]
    Uncompressed,
    /// `COMPRESSED` header with a codec container
    Compressed,
    /// Headerless verbose stream
    LegacyStream,
    /// JSON metadata block and base-85 XZ payload
    LegacyMetadata,
    /// Sectioned text
    LegacySections {
        /// Body was base-85 XZ
        compressed: bool,
    },
}

/// Write the header of an uncompressed artifact
pub fn write_uncompressed_header(out: &mut dyn Write) -> Result<()> {
    out.write_all(UNCOMPRESSED_HEADER.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Assemble an uncompressed artifact around a stream
pub fn uncompressed_artifact(stream: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(UNCOMPRESSED_HEADER.len() + 1 + stream.len());
    out.extend_from_slice(UNCOMPRESSED_HEADER.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(stream);
    out
}

/// Assemble a compressed artifact around a dispatcher result
pub fn compressed_artifact(payload: &CompressedPayload) -> Vec<u8> {
    format!("{}\n{}", COMPRESSED_HEADER, payload.to_container()).into_bytes()
}

/// Decode an artifact of any supported layout
///
/// # Errors
///
/// - [`SnapshotError::UnrecognizedFormat`] when the input matches no layout
/// - [`SnapshotError::UnsupportedCodec`] when the container names an unknown codec
///
/// Damaged content is not an error: it shows up in the returned report.
pub fn decode_artifact(bytes: &[u8]) -> Result<DecodeOutcome> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut outcome = DecodeOutcome::default();

    if bytes.is_empty() {
        outcome.report.truncated = true;
        outcome.report.warn("artifact is empty".to_string());
        return Ok(outcome);
    }

    let (first_line, rest) = split_first_line(bytes);
    let first = first_line.map(|l| l.trim_ascii_end());

    match first {
        Some(line) if line == UNCOMPRESSED_HEADER.as_bytes() => {
            outcome.layout = ArtifactLayout::Uncompressed;
            decode_stream_into(rest, &mut outcome);
        }
        Some(line) if line == COMPRESSED_HEADER.as_bytes() => {
            outcome.layout = ArtifactLayout::Compressed;
            decode_container(rest, &mut outcome)?;
        }
        Some(line) if line == verbose::SEPARATOR.as_bytes() => {
            outcome.layout = ArtifactLayout::LegacyStream;
            decode_stream_into(bytes, &mut outcome);
        }
        Some(line) if line == legacy::UNCOMPRESSED_HEADER.as_bytes() => {
            outcome.layout = ArtifactLayout::LegacySections { compressed: false };
            outcome.entries = legacy::decode_sections(rest, &mut outcome.report);
        }
        Some(line) if line == legacy::COMPRESSED_HEADER.as_bytes() => {
            outcome.layout = ArtifactLayout::LegacySections { compressed: true };
            outcome.codec = Some(CodecTag::Xz);
            let body = decompress_into_report(CodecTag::Xz, rest, &mut outcome.report)?;
            outcome.entries = legacy::decode_sections(&body, &mut outcome.report);
        }
        Some(line) if line.starts_with(b"{") => {
            outcome.layout = ArtifactLayout::LegacyMetadata;
            decode_metadata_artifact(bytes, &mut outcome)?;
        }
        _ if is_cut_header(bytes) => {
            outcome.report.truncated = true;
            outcome
                .report
                .warn("artifact ends inside its header line".to_string());
        }
        _ => {
            let preview: String = String::from_utf8_lossy(&bytes[..bytes.len().min(40)]).into();
            return Err(SnapshotError::UnrecognizedFormat(format!(
                "unexpected start {:?}",
                preview
            )));
        }
    }

    info!(
        "Decoded {:?} artifact: {} entries, {} failed, truncated={}",
        outcome.layout,
        outcome.entries.len(),
        outcome.report.failed(),
        outcome.report.truncated
    );
    Ok(outcome)
}

/// First line (without `\n`) and everything after it; `None` if there is no newline
fn split_first_line(bytes: &[u8]) -> (Option<&[u8]>, &[u8]) {
    match bytes.iter().position(|&b| b == b'\n') {
        Some(i) => (Some(&bytes[..i]), &bytes[i + 1..]),
        None => (None, &bytes[bytes.len()..]),
    }
}

fn is_cut_header(bytes: &[u8]) -> bool {
    let trimmed = bytes.trim_ascii_end();
    [
        UNCOMPRESSED_HEADER,
        COMPRESSED_HEADER,
        verbose::SEPARATOR,
        legacy::UNCOMPRESSED_HEADER,
        legacy::COMPRESSED_HEADER,
    ]
    .iter()
    .any(|header| header.as_bytes().starts_with(trimmed))
}

fn decode_stream_into(stream: &[u8], outcome: &mut DecodeOutcome) {
    let (entries, framing) = decode_stream(stream, &mut outcome.report);
    outcome.entries = entries;
    outcome.framing = framing;
}

fn decode_container(container: &[u8], outcome: &mut DecodeOutcome) -> Result<()> {
    let Some(colon) = container.iter().position(|&b| b == b':') else {
        let partial = String::from_utf8_lossy(container.trim_ascii()).into_owned();
        if CodecTag::ALL
            .iter()
            .any(|tag| tag.as_str().starts_with(partial.as_str()))
        {
            outcome.report.truncated = true;
            outcome
                .report
                .warn("artifact ends before its codec tag".to_string());
            return Ok(());
        }
        return Err(SnapshotError::UnsupportedCodec(partial));
    };

    let tag_text = String::from_utf8_lossy(container[..colon].trim_ascii());
    let tag: CodecTag = tag_text.parse()?;
    outcome.codec = Some(tag);
    debug!("Artifact payload uses {}", tag);

    let stream = decompress_into_report(tag, &container[colon + 1..], &mut outcome.report)?;
    decode_stream_into(&stream, outcome);
    Ok(())
}

/// Undo a codec, keeping whatever survives damage
fn decompress_into_report(
    tag: CodecTag,
    payload: &[u8],
    report: &mut DecodeReport,
) -> Result<Vec<u8>> {
    if tag == CodecTag::Raw {
        return Ok(payload.to_vec());
    }

    let text: String = payload
        .iter()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|&b| b as char)
        .collect();
    if text.is_empty() {
        report.truncated = true;
        report.warn(format!("{} payload is empty", tag));
        return Ok(Vec::new());
    }

    match CompressionDispatcher::decompress_lenient(tag.as_str(), &text) {
        Ok((bytes, None)) => Ok(bytes),
        Ok((bytes, Some(problem))) => {
            report.truncated = true;
            report.warn(format!(
                "compressed payload is damaged ({}), recovered {} bytes",
                problem,
                bytes.len()
            ));
            Ok(bytes)
        }
        Err(SnapshotError::Decompression(msg)) => {
            report.truncated = true;
            report.warn(format!("nothing could be decompressed: {}", msg));
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

fn decode_metadata_artifact(bytes: &[u8], outcome: &mut DecodeOutcome) -> Result<()> {
    let mut metadata = Vec::new();
    let mut pos = 0;
    let mut payload_start = None;

    while pos < bytes.len() {
        let end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |i| pos + i);
        let line = &bytes[pos..end];
        if line.trim_ascii() == METADATA_END.as_bytes() {
            payload_start = Some((end + 1).min(bytes.len()));
            break;
        }
        metadata.extend_from_slice(line);
        metadata.push(b'\n');
        pos = end + 1;
    }

    let Some(payload_start) = payload_start else {
        // Metadata is a single JSON line; anything longer without the end
        // marker is not one of ours
        let lines = bytes.trim_ascii_end().split(|&b| b == b'\n').count();
        if lines <= 2 {
            outcome.report.truncated = true;
            outcome
                .report
                .warn("artifact ends inside its metadata block".to_string());
            return Ok(());
        }
        return Err(SnapshotError::UnrecognizedFormat(
            "JSON header without a metadata end marker".to_string(),
        ));
    };

    let method = serde_json::from_slice::<serde_json::Value>(&metadata)
        .ok()
        .and_then(|v| {
            v.get("compression_method")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "lzma".to_string());
    let tag = match method.as_str() {
        "lzma" | "xz" => CodecTag::Xz,
        other => other.parse()?,
    };
    outcome.codec = Some(tag);

    let stream = decompress_into_report(tag, &bytes[payload_start..], &mut outcome.report)?;
    decode_stream_into(&stream, outcome);
    Ok(())
}
