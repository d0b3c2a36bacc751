//! Text/binary content classification
//!
//! Decides whether a file's bytes can be embedded verbatim in the stream or
//! must be re-encoded. The decision is a pure function of the file path and a
//! leading sample of its bytes, checked from most to least authoritative:
//!
//! 1. Known binary extensions (executables, archives, media, fonts, documents)
//! 2. Known text extensions (source code, markup, configuration)
//! 3. The sample is UTF-8 without NUL bytes
//! 4. The sample decodes under a legacy encoding (UTF-16 with BOM, Latin-1)
//!    and looks textual
//! 5. Byte heuristics over the sample: NUL bytes, low printable ratio or high
//!    control ratio mean binary
//!
//! The thresholds in step 5 are tuned constants, not guarantees; they live in
//! [`ClassifierPolicy`] so callers can adjust them.
//!
//! ## Example
//!
//! ```rust
//! use foldsnap::classify::ContentClassifier;
//! use foldsnap::types::EncodingHint;
//! use std::path::Path;
//!
//! let classifier = ContentClassifier::default();
//! assert_eq!(classifier.classify(Path::new("logo.png"), b"plain"), EncodingHint::Binary);
//! assert_eq!(classifier.classify(Path::new("notes"), b"hello\n"), EncodingHint::Text);
//! assert_eq!(classifier.classify(Path::new("blob"), &[0, 159, 146, 150]), EncodingHint::Binary);
//! ```

use crate::error::{Result, SnapshotError};
use crate::types::EncodingHint;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Extensions that are always binary
const BINARY_EXTENSIONS: &[&str] = &[
    // Executables and objects
    "exe", "dll", "so", "dylib", "bin", "o", "a", "lib", "obj", "class", "jar", "war", "pyc",
    "pyo", "wasm",
    // Archives
    "zip", "rar", "7z", "tar", "gz", "tgz", "bz2", "xz", "zst", "lz4", "lzma", "br", "cab",
    "iso", "dmg",
    // Images
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "webp", "tif", "tiff", "psd", "heic", "avif",
    // Audio
    "mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "opus",
    // Video
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg",
    // Fonts
    "ttf", "otf", "woff", "woff2", "eot",
    // Documents and databases
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "epub", "mobi",
    "sqlite", "db",
];

/// Extensions that are always text
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "rst", "log", "csv", "tsv",
    // Source code
    "rs", "py", "js", "mjs", "ts", "jsx", "tsx", "c", "h", "cpp", "hpp", "cc", "java", "kt",
    "go", "rb", "php", "pl", "lua", "sql", "r", "swift", "m", "mm", "cs", "scala", "hs",
    "sh", "bash", "zsh", "fish", "bat", "ps1",
    // Markup and styles
    "html", "htm", "xml", "svg", "css", "scss", "sass", "less", "vue", "svelte", "tex",
    // Configuration
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "env", "lock", "gitignore",
];

/// Tunable thresholds for the byte-level heuristic
///
/// ```rust
/// use foldsnap::classify::ClassifierPolicy;
///
/// let strict = ClassifierPolicy { min_printable_ratio: 0.9, ..Default::default() };
/// assert!(strict.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierPolicy {
    /// Bytes of the file examined by the heuristics
    pub sample_len: usize,
    /// Below this share of printable bytes content is binary
    pub min_printable_ratio: f64,
    /// Above this share of control bytes content is binary
    pub max_control_ratio: f64,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            sample_len: 8192,
            min_printable_ratio: 0.70,
            max_control_ratio: 0.10,
        }
    }
}

impl ClassifierPolicy {
    /// Reject thresholds outside `0.0..=1.0` and an empty sample
    pub fn validate(&self) -> Result<()> {
        let in_range = |r: f64| (0.0..=1.0).contains(&r);
        if self.sample_len == 0 {
            return Err(SnapshotError::InvalidConfiguration(
                "classifier sample_len must be positive".to_string(),
            ));
        }
        if !in_range(self.min_printable_ratio) || !in_range(self.max_control_ratio) {
            return Err(SnapshotError::InvalidConfiguration(format!(
                "classifier ratios must be within 0..=1 (printable {}, control {})",
                self.min_printable_ratio, self.max_control_ratio
            )));
        }
        Ok(())
    }
}

/// Pure text/binary classifier
#[derive(Debug, Clone, Default)]
pub struct ContentClassifier {
    policy: ClassifierPolicy,
}

impl ContentClassifier {
    /// Create a classifier with the given thresholds
    pub fn new(policy: ClassifierPolicy) -> Self {
        Self { policy }
    }

    /// Thresholds in use
    pub fn policy(&self) -> &ClassifierPolicy {
        &self.policy
    }

    /// Classify a file from its path and leading bytes
    ///
    /// Only the first `sample_len` bytes of `sample` are examined, so passing
    /// the whole file is fine.
    pub fn classify(&self, path: &Path, sample: &[u8]) -> EncodingHint {
        if let Some(ext) = extension_of(path) {
            if BINARY_EXTENSIONS.contains(&ext.as_str()) {
                return EncodingHint::Binary;
            }
            if TEXT_EXTENSIONS.contains(&ext.as_str()) {
                return EncodingHint::Text;
            }
        }

        let sample = &sample[..sample.len().min(self.policy.sample_len)];
        if sample.is_empty() {
            return EncodingHint::Text;
        }

        if is_utf8_sample(sample) && !sample.contains(&0) {
            return EncodingHint::Text;
        }

        if self.is_legacy_text(sample) {
            return EncodingHint::Text;
        }

        if self.looks_binary(sample) {
            EncodingHint::Binary
        } else {
            EncodingHint::Text
        }
    }

    /// UTF-16 with a byte order mark, or single-byte Latin-1 that reads as text
    fn is_legacy_text(&self, sample: &[u8]) -> bool {
        if let Some(chars) = decode_utf16_bom(sample) {
            if chars.is_empty() {
                return true;
            }
            let printable = chars
                .iter()
                .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
                .count();
            return printable as f64 / chars.len() as f64 >= self.policy.min_printable_ratio;
        }

        if sample.contains(&0) {
            return false;
        }
        let printable = sample
            .iter()
            .filter(|&&b| is_ascii_textual(b) || b >= 0xA0)
            .count();
        let control = sample.iter().filter(|&&b| is_control(b)).count();
        let len = sample.len() as f64;
        printable as f64 / len >= self.policy.min_printable_ratio
            && control as f64 / len <= self.policy.max_control_ratio
    }

    fn looks_binary(&self, sample: &[u8]) -> bool {
        if sample.contains(&0) {
            return true;
        }
        let len = sample.len() as f64;
        let printable = sample.iter().filter(|&&b| is_ascii_textual(b)).count();
        let control = sample.iter().filter(|&&b| is_control(b)).count();
        printable as f64 / len < self.policy.min_printable_ratio
            || control as f64 / len > self.policy.max_control_ratio
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Valid UTF-8, tolerating a multi-byte sequence cut off by the sample end
fn is_utf8_sample(sample: &[u8]) -> bool {
    match std::str::from_utf8(sample) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && sample.len() - e.valid_up_to() < 4,
    }
}

fn decode_utf16_bom(sample: &[u8]) -> Option<Vec<char>> {
    let little_endian = match sample {
        [0xFF, 0xFE, ..] => true,
        [0xFE, 0xFF, ..] => false,
        _ => return None,
    };
    let units = sample[2..].chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units).collect::<std::result::Result<Vec<_>, _>>().ok()
}

fn is_ascii_textual(b: u8) -> bool {
    (0x20..0x7F).contains(&b) || matches!(b, b'\t' | b'\n' | b'\r' | 0x0C)
}

fn is_control(b: u8) -> bool {
    (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r' | 0x0C | 0x1B)) || b == 0x7F
}
