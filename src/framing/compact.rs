//! Compact inline-marker framing
//!
//! Records are introduced by marker lines and run until the next marker:
//!
//! ```text
//!
//! @src/app.css
//! body { margin: 0 }
//! @media screen { body { margin: 1em } }
//!
//! @empty
//! [EMPTY_DIRECTORY]
//! @logo.png
//! B
//! iVBORw0KGgo=
//! !locked.txt
//! Permission denied
//! ```
//!
//! File content can contain lines that look like markers, so a line counts as
//! a marker only if its name passes [`is_marker_name`]: common at-rules,
//! decorators and doc tags are rejected, as are lines carrying code tokens.
//! The writer makes its own output unambiguous by re-encoding as binary any
//! text that would confuse the decoder.

use super::{next_line, Framing, RecordWrite};
use crate::error::Result;
use crate::record::{EncodedRecord, RecordKind};
use crate::types::{DecodeReport, EntryKind, FramingKind, TreeEntry};
use std::io::Write;
use tracing::{debug, trace};

/// Payload of a directory record
pub const EMPTY_DIRECTORY: &str = "[EMPTY_DIRECTORY]";

/// First payload line of a binary record
const BINARY_PREFIX: &str = "B\n";

/// Keywords that follow `@` in style sheets, templates and doc comments
const FALSE_POSITIVE_KEYWORDS: &[&str] = &[
    // CSS at-rules
    "media", "import", "charset", "font-face", "keyframes", "supports", "page", "namespace",
    "layer", "container", "property", "counter-style", "document", "viewport",
    // Tailwind, SCSS and Less
    "tailwind", "apply", "screen", "variants", "responsive", "include", "mixin", "extend",
    "use", "forward", "if", "else", "each", "for", "while", "function", "return", "warn",
    "error", "debug", "content", "at-root",
    // Decorators and annotations
    "Override", "Deprecated", "SuppressWarnings", "FunctionalInterface", "Test", "Before",
    "After", "Component", "Injectable", "Input", "Output", "Autowired", "Entity",
    "staticmethod", "classmethod", "abstractmethod", "dataclass", "pytest", "override",
    // Doc tags
    "param", "returns", "throws", "author", "type", "typedef", "see", "since", "deprecated",
    "example", "brief", "todo",
];

/// Annotations that stand alone on their line
const BARE_DECORATORS: &[&str] = &[
    "Override", "Deprecated", "Test", "Before", "After", "Component", "Injectable", "Entity",
    "Autowired", "FunctionalInterface", "staticmethod", "classmethod", "abstractmethod",
    "dataclass", "property", "override", "pytest", "else",
];

/// Decorator prefixes that read as a call, e.g. `@app.route("/")`
const CALL_PREFIXES: &[&str] = &["app.", "router.", "bp.", "api.", "blueprint.", "pytest.", "mock."];

/// Tokens that only appear in code, never in a relative path
const CODE_TOKENS: &[&str] = &[
    " {", "{ ", "};", "();", " => ", " = ", "def ", "class ", "function ", "return ",
];

/// Whether `name` (the text after `@` or `!`) is accepted as a record path
///
/// ```rust
/// use foldsnap::framing::compact::is_marker_name;
///
/// assert!(is_marker_name("src/media/logo.png"));
/// assert!(is_marker_name("include"));
/// assert!(!is_marker_name("media screen and (max-width: 600px) {"));
/// assert!(!is_marker_name("app.route('/')"));
/// assert!(!is_marker_name(" indented"));
/// ```
pub fn is_marker_name(name: &str) -> bool {
    if name.is_empty() || name.starts_with(char::is_whitespace) {
        return false;
    }
    if name.chars().any(char::is_control) {
        return false;
    }
    if name.ends_with('{') || name.ends_with(';') {
        return false;
    }
    if BARE_DECORATORS.contains(&name) {
        return false;
    }
    if CODE_TOKENS.iter().any(|token| name.contains(token)) {
        return false;
    }
    if CALL_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix) && name.contains('('))
    {
        return false;
    }
    !FALSE_POSITIVE_KEYWORDS
        .iter()
        .any(|keyword| keyword_matches(name, keyword))
}

/// `keyword` followed by something that cannot continue a path segment
fn keyword_matches(name: &str, keyword: &str) -> bool {
    match name.strip_prefix(keyword) {
        Some(rest) => match rest.chars().next() {
            None => false,
            Some(c) => !(c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '\\')),
        },
        None => false,
    }
}

/// Whether a text payload would decode as something else
fn text_needs_escape(text: &str) -> bool {
    if text == EMPTY_DIRECTORY
        || text.starts_with(BINARY_PREFIX)
        || is_cut_structure(text.as_bytes())
    {
        return true;
    }
    text.split('\n').any(|line| {
        line.strip_prefix('@')
            .or_else(|| line.strip_prefix('!'))
            .is_some_and(is_marker_name)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Entry,
    Error,
}

#[derive(Debug)]
struct Marker {
    path: String,
    kind: MarkerKind,
    offset: usize,
}

fn parse_marker(line: &[u8], offset: usize) -> Option<Marker> {
    let (kind, rest) = match line.first()? {
        b'@' => (MarkerKind::Entry, &line[1..]),
        b'!' => (MarkerKind::Error, &line[1..]),
        _ => return None,
    };
    let name = std::str::from_utf8(rest).ok()?;
    is_marker_name(name).then(|| Marker {
        path: name.to_string(),
        kind,
        offset,
    })
}

/// Decoder state, advanced one line at a time
enum ScanState {
    ScanningForMarker { garbage: bool },
    AccumulatingPayload { marker: Marker, start: usize },
}

/// `\n@path\n` markers followed by inline payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactFraming;

impl Framing for CompactFraming {
    fn kind(&self) -> FramingKind {
        FramingKind::Compact
    }

    fn write_record(&self, out: &mut dyn Write, record: &EncodedRecord) -> Result<RecordWrite> {
        if record.path.contains('\n') || !is_marker_name(&record.path) {
            return Ok(RecordWrite::Skipped(format!(
                "path {:?} cannot be written as a compact marker",
                record.path
            )));
        }

        let framed = match record.kind {
            RecordKind::Dir => format!("\n@{}\n{}", record.path, EMPTY_DIRECTORY),
            // An empty binary record would read as one cut after its prefix
            RecordKind::BinaryFile if record.payload.is_empty() => format!("\n@{}\n", record.path),
            RecordKind::BinaryFile => {
                format!("\n@{}\n{}{}", record.path, BINARY_PREFIX, record.payload)
            }
            RecordKind::TextFile if text_needs_escape(&record.payload) => {
                debug!("{} contains marker-like lines, storing as binary", record.path);
                let escaped = EncodedRecord::binary(&record.path, record.payload.as_bytes());
                return self.write_record(out, &escaped);
            }
            RecordKind::TextFile => format!("\n@{}\n{}", record.path, record.payload),
            RecordKind::Error => format!(
                "\n!{}\n{}\n",
                record.path,
                record.payload.replace(|c| c == '\r' || c == '\n', " ")
            ),
        };

        out.write_all(framed.as_bytes())?;
        Ok(RecordWrite::Written {
            kind: record.kind,
            bytes: framed.len() as u64,
        })
    }

    fn decode(&self, stream: &[u8], report: &mut DecodeReport) -> Vec<TreeEntry> {
        let mut entries = Vec::new();
        let mut state = ScanState::ScanningForMarker { garbage: false };
        let mut pos = 0;

        while let Some((line, next)) = next_line(stream, pos) {
            let marker = parse_marker(line, pos);

            if let Some(marker) = &marker {
                if next.is_none() {
                    // A marker with no newline after it was cut mid-line
                    finish(state, stream, marker.offset, report, &mut entries);
                    report.records_seen += 1;
                    report.truncated = true;
                    report.warn(format!("marker for {} cut off at end of stream", marker.path));
                    return entries;
                }
            }

            state = match (state, marker) {
                (state, Some(marker)) => {
                    finish(state, stream, pos, report, &mut entries);
                    report.records_seen += 1;
                    ScanState::AccumulatingPayload {
                        start: next.unwrap_or(stream.len()),
                        marker,
                    }
                }
                (ScanState::ScanningForMarker { garbage }, None) => {
                    if !garbage && !line.trim_ascii().is_empty() {
                        report.framing_errors += 1;
                        report.warn(format!(
                            "unexpected data at byte {} before any record marker",
                            pos
                        ));
                        ScanState::ScanningForMarker { garbage: true }
                    } else {
                        ScanState::ScanningForMarker { garbage }
                    }
                }
                (accumulating, None) => accumulating,
            };

            match next {
                Some(n) => pos = n,
                None => break,
            }
        }

        if let ScanState::AccumulatingPayload { marker, start } = state {
            let payload = &stream[start.min(stream.len())..];
            if marker.kind == MarkerKind::Entry && is_cut_structure(payload) {
                report.truncated = true;
                report.warn(format!("record {} cut off at end of stream", marker.path));
            } else {
                finish(
                    ScanState::AccumulatingPayload { marker, start },
                    stream,
                    stream.len() + 1,
                    report,
                    &mut entries,
                );
            }
        }
        entries
    }
}

/// Payload that is the start of a directory or binary record and nothing more
fn is_cut_structure(payload: &[u8]) -> bool {
    (!payload.is_empty()
        && payload.len() < EMPTY_DIRECTORY.len()
        && EMPTY_DIRECTORY.as_bytes().starts_with(payload))
        || payload == b"B"
        || payload == BINARY_PREFIX.as_bytes()
}

/// Close the record being accumulated; its payload ends before the `\n`
/// preceding `boundary`
fn finish(
    state: ScanState,
    stream: &[u8],
    boundary: usize,
    report: &mut DecodeReport,
    entries: &mut Vec<TreeEntry>,
) {
    let ScanState::AccumulatingPayload { marker, start } = state else {
        return;
    };
    let end = boundary.saturating_sub(1).min(stream.len());
    let payload = if end > start { &stream[start..end] } else { &[][..] };

    let Ok(text) = std::str::from_utf8(payload) else {
        report.content_errors += 1;
        report.warn(format!("skipping {}: payload is not valid UTF-8", marker.path));
        return;
    };

    let record = match marker.kind {
        MarkerKind::Error => EncodedRecord {
            path: marker.path,
            kind: RecordKind::Error,
            payload: text.strip_suffix('\n').unwrap_or(text).to_string(),
            original_size: None,
        },
        MarkerKind::Entry if text == EMPTY_DIRECTORY => EncodedRecord {
            path: marker.path,
            kind: RecordKind::Dir,
            payload: String::new(),
            original_size: None,
        },
        MarkerKind::Entry => match text.strip_prefix(BINARY_PREFIX) {
            Some(encoded) => EncodedRecord {
                path: marker.path,
                kind: RecordKind::BinaryFile,
                payload: encoded.to_string(),
                original_size: None,
            },
            None => EncodedRecord {
                path: marker.path,
                kind: RecordKind::TextFile,
                payload: text.to_string(),
                original_size: None,
            },
        },
    };

    match record.into_entry() {
        Ok(entry) => {
            trace!("decoded {}", entry.relative_path);
            report.recovered += 1;
            if matches!(entry.kind, EntryKind::EnumerationError { .. }) {
                report.error_records += 1;
            }
            entries.push(entry);
        }
        Err(e) => {
            report.content_errors += 1;
            report.warn(format!("skipping record: {}", e));
        }
    }
}
