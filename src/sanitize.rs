//! Path sanitation for restore
//!
//! Paths in an artifact are untrusted. Before anything touches the disk each
//! one is split on `/` and `\`, every segment is made portable, and the result
//! is guaranteed to stay below the destination root:
//!
//! - `<>:"/\|?*` and control characters become `_`
//! - trailing dots and spaces are stripped
//! - reserved device names (`CON`, `PRN`, `AUX`, `NUL`, `COM1`-`COM9`,
//!   `LPT1`-`LPT9`) get a `_` prefix
//! - `..` becomes `__`; empty and `.` segments are dropped
//! - segments are cut to 255 bytes, whole paths over 4096 bytes are rejected
//!
//! ```rust
//! use foldsnap::sanitize::sanitize_relative_path;
//! use std::path::PathBuf;
//!
//! assert_eq!(
//!     sanitize_relative_path("../etc/CON.txt").unwrap(),
//!     PathBuf::from("__/etc/_CON.txt")
//! );
//! assert_eq!(
//!     sanitize_relative_path("/abs/what?.txt ").unwrap(),
//!     PathBuf::from("abs/what_.txt")
//! );
//! ```

use crate::error::{Result, SnapshotError};
use std::path::PathBuf;

/// Longest segment kept, in bytes
pub const MAX_SEGMENT_BYTES: usize = 255;

/// Longest sanitized path accepted, in bytes
pub const MAX_PATH_BYTES: usize = 4096;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize one path segment; `None` means the segment is dropped
pub fn sanitize_segment(segment: &str) -> Option<String> {
    match segment {
        "" | "." => return None,
        ".." => return Some("__".to_string()),
        _ => {}
    }

    let replaced: String = segment
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let mut clean = replaced.trim_end_matches(|c| c == '.' || c == ' ').to_string();
    if clean.is_empty() {
        clean.push('_');
    }

    let stem = clean.split('.').next().unwrap_or_default();
    if RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        clean.insert(0, '_');
    }

    if clean.len() > MAX_SEGMENT_BYTES {
        let mut cut = MAX_SEGMENT_BYTES;
        while !clean.is_char_boundary(cut) {
            cut -= 1;
        }
        clean.truncate(cut);
        let trimmed_len = clean.trim_end_matches(|c| c == '.' || c == ' ').len();
        clean.truncate(trimmed_len);
        if clean.is_empty() {
            clean.push('_');
        }
    }
    Some(clean)
}

/// Sanitize a stream path into a relative path safe to join onto a root
///
/// # Errors
///
/// [`SnapshotError::InvalidPath`] if nothing is left after sanitizing or the
/// result exceeds [`MAX_PATH_BYTES`].
pub fn sanitize_relative_path(path: &str) -> Result<PathBuf> {
    let segments: Vec<String> = path
        .split(|c| c == '/' || c == '\\')
        .filter_map(sanitize_segment)
        .collect();

    if segments.is_empty() {
        return Err(SnapshotError::invalid_path(path, "no usable path segments"));
    }

    let total = segments.iter().map(|s| s.len()).sum::<usize>() + segments.len() - 1;
    if total > MAX_PATH_BYTES {
        return Err(SnapshotError::invalid_path(
            path,
            format!("{} bytes exceeds the {} byte limit", total, MAX_PATH_BYTES),
        ));
    }

    Ok(segments.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths_are_unchanged() {
        assert_eq!(
            sanitize_relative_path("src/main.rs").unwrap(),
            PathBuf::from("src/main.rs")
        );
        assert_eq!(
            sanitize_relative_path("docs/说明.md").unwrap(),
            PathBuf::from("docs/说明.md")
        );
    }

    #[test]
    fn test_forbidden_characters() {
        assert_eq!(sanitize_segment("a<b>c:d\"e|f?g*h").unwrap(), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize_segment("tab\there").unwrap(), "tab_here");
    }

    #[test]
    fn test_trailing_dots_and_spaces() {
        assert_eq!(sanitize_segment("name. . ").unwrap(), "name");
        assert_eq!(sanitize_segment("...").unwrap(), "_");
    }

    #[test]
    fn test_reserved_names() {
        assert_eq!(sanitize_segment("con").unwrap(), "_con");
        assert_eq!(sanitize_segment("LPT9.log").unwrap(), "_LPT9.log");
        assert_eq!(sanitize_segment("CONSOLE").unwrap(), "CONSOLE");
    }

    #[test]
    fn test_parent_references_cannot_escape() {
        let path = sanitize_relative_path("../../outside.txt").unwrap();
        assert_eq!(path, PathBuf::from("__/__/outside.txt"));
        assert!(path.components().all(|c| matches!(c, std::path::Component::Normal(_))));

        assert_eq!(
            sanitize_relative_path("a\\..\\b").unwrap(),
            PathBuf::from("a/__/b")
        );
    }

    #[test]
    fn test_empty_and_dot_segments_dropped() {
        assert_eq!(
            sanitize_relative_path("./a//b/./c").unwrap(),
            PathBuf::from("a/b/c")
        );
        assert!(sanitize_relative_path("/./").is_err());
    }

    #[test]
    fn test_long_segment_is_cut_on_char_boundary() {
        let long = "é".repeat(200);
        let clean = sanitize_segment(&long).unwrap();
        assert!(clean.len() <= MAX_SEGMENT_BYTES);
        assert_eq!(clean.len(), 254);
    }

    #[test]
    fn test_cut_segment_has_no_trailing_dot_or_space() {
        let dotted = format!("{}. x", "a".repeat(254));
        let clean = sanitize_segment(&dotted).unwrap();
        assert_eq!(clean, "a".repeat(254));

        let spaced = format!("{}  .x", "b".repeat(253));
        let clean = sanitize_segment(&spaced).unwrap();
        assert_eq!(clean, "b".repeat(253));
    }

    #[test]
    fn test_overlong_path_rejected() {
        let long = vec!["a".repeat(200); 25].join("/");
        assert!(matches!(
            sanitize_relative_path(&long),
            Err(SnapshotError::InvalidPath { .. })
        ));
    }
}
