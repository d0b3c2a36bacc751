//! Reader for the sectioned text layout of the earliest artifacts
//!
//! Those artifacts are a format line followed by one block per file:
//!
//! ```text
//! === SNAPSHOT_FORMAT: UNCOMPRESSED ===
//!
//! === 文件: src/main.py ===
//! print("hi")
//!
//! ==================================================
//!
//! ```
//!
//! Only text files were stored, directories were implicit and unreadable
//! files left a `!!! 读取文件 <path> 时出错: <error> !!!` line. The compressed
//! variant holds the same blocks as base-85 XZ after a blank line.

use crate::types::{DecodeReport, EncodingHint, TreeEntry};
use tracing::trace;

/// Format line of an uncompressed sectioned artifact
pub const UNCOMPRESSED_HEADER: &str = "=== SNAPSHOT_FORMAT: UNCOMPRESSED ===";

/// Format line of a compressed sectioned artifact
pub const COMPRESSED_HEADER: &str = "=== SNAPSHOT_FORMAT: COMPRESSED ===";

const BLOCK_PREFIX: &str = "=== 文件: ";
const BLOCK_SUFFIX: &str = " ===";
const ERROR_PREFIX: &str = "!!! 读取文件 ";
const ERROR_INFIX: &str = " 时出错: ";
const ERROR_SUFFIX: &str = " !!!";

fn block_separator() -> String {
    format!("\n{}", "=".repeat(50))
}

struct Block<'a> {
    path: &'a str,
    header_start: usize,
    content_start: usize,
}

/// Decode the body of a sectioned artifact (everything after the format line)
pub fn decode_sections(body: &[u8], report: &mut DecodeReport) -> Vec<TreeEntry> {
    let text = match std::str::from_utf8(body) {
        Ok(text) => text,
        Err(e) => {
            report.content_errors += 1;
            report.warn(format!(
                "sectioned artifact is not valid UTF-8 after byte {}, ignoring the rest",
                e.valid_up_to()
            ));
            std::str::from_utf8(&body[..e.valid_up_to()]).unwrap_or_default()
        }
    };
    decode_text(text, report)
}

fn decode_text(text: &str, report: &mut DecodeReport) -> Vec<TreeEntry> {
    let blocks = find_blocks(text);
    let mut entries = Vec::new();

    let preamble_end = blocks.first().map_or(text.len(), |b| b.header_start);
    collect_error_lines(&text[..preamble_end], report, &mut entries);

    let separator = block_separator();
    for (i, block) in blocks.iter().enumerate() {
        let is_last = i + 1 == blocks.len();
        let end = blocks.get(i + 1).map_or(text.len(), |b| b.header_start);
        let region = &text[block.content_start..end];
        report.records_seen += 1;

        match region.find(&separator) {
            Some(idx) => {
                trace!("decoded {}", block.path);
                push_file(block.path, &region[..idx], report, &mut entries);
                collect_error_lines(&region[idx + separator.len()..], report, &mut entries);
            }
            None => {
                if let Some(error) = parse_error_lines(region).next() {
                    report.recovered += 1;
                    report.error_records += 1;
                    entries.push(TreeEntry::error(error.0, error.1));
                } else if is_last {
                    report.truncated = true;
                    report.warn(format!("block for {} has no closing separator", block.path));
                } else {
                    push_file(block.path, region, report, &mut entries);
                }
            }
        }
    }
    entries
}

fn push_file(path: &str, content: &str, report: &mut DecodeReport, entries: &mut Vec<TreeEntry>) {
    let path = path.trim().replace('\\', "/");
    report.recovered += 1;
    entries.push(TreeEntry::file(
        path,
        content.as_bytes().to_vec(),
        EncodingHint::Text,
    ));
}

fn find_blocks(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let Some(header) = line.strip_suffix('\n') else {
            // A header without its newline was cut off
            continue;
        };
        let header = header.strip_suffix('\r').unwrap_or(header);
        if let Some(path) = header
            .strip_prefix(BLOCK_PREFIX)
            .and_then(|rest| rest.strip_suffix(BLOCK_SUFFIX))
        {
            if !path.trim().is_empty() {
                blocks.push(Block {
                    path,
                    header_start: start,
                    content_start: offset,
                });
            }
        }
    }
    blocks
}

fn parse_error_lines(region: &str) -> impl Iterator<Item = (String, String)> + '_ {
    region.lines().filter_map(|line| {
        let inner = line
            .trim()
            .strip_prefix(ERROR_PREFIX)?
            .strip_suffix(ERROR_SUFFIX)?;
        let (path, message) = inner.split_once(ERROR_INFIX)?;
        Some((path.trim().replace('\\', "/"), message.to_string()))
    })
}

fn collect_error_lines(region: &str, report: &mut DecodeReport, entries: &mut Vec<TreeEntry>) {
    for (path, message) in parse_error_lines(region) {
        report.records_seen += 1;
        report.recovered += 1;
        report.error_records += 1;
        entries.push(TreeEntry::error(path, message));
    }
}
