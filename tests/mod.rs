//! Main test module for foldsnap
//!
//! This module includes all test suites:
//! - Integration tests for real-world trees and restore scenarios
//! - Chaos tests for damaged and truncated artifacts
//! - Property-based tests for round-trip invariants

pub mod chaos;
pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::foldsnap::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_empty_directory() {
        let source = TempDir::new().unwrap();
        let snapshotter = Snapshotter::builder().build().unwrap();

        let (artifact, summary) = snapshotter.encode_tree(source.path()).unwrap();
        assert_eq!(artifact, b"UNCOMPRESSED\n");
        assert_eq!(summary.records_written(), 0);

        let outcome = snapshotter.decode_artifact(&artifact).unwrap();
        assert!(outcome.entries.is_empty());
        assert!(outcome.report.is_clean());
    }

    #[test]
    fn test_special_filenames() {
        let source = TempDir::new().unwrap();
        let restored = TempDir::new().unwrap();

        let special_names = vec![
            "file with spaces.txt",
            "file-with-dashes.txt",
            "file_with_underscores.txt",
            "file.multiple.dots.txt",
            "UPPERCASE.TXT",
            "数据.txt",
            "émoji-🎉.md",
            "@scoped.json",
            "!important.txt",
        ];
        for name in &special_names {
            fs::write(source.path().join(name), format!("content of {}\n", name)).unwrap();
        }

        let snapshotter = Snapshotter::builder().build().unwrap();
        let (artifact, _) = snapshotter.encode_tree(source.path()).unwrap();
        let result = snapshotter.restore_artifact(&artifact, restored.path()).unwrap();
        assert_eq!(result.files_restored, special_names.len());

        for name in &special_names {
            let content = fs::read_to_string(restored.path().join(name)).unwrap();
            assert_eq!(content, format!("content of {}\n", name));
        }
    }

    #[test]
    fn test_single_file_source() {
        let source = TempDir::new().unwrap();
        let restored = TempDir::new().unwrap();
        let file = source.path().join("notes.md");
        fs::write(&file, "# Notes\n").unwrap();

        let snapshotter = Snapshotter::builder().compress(true).build().unwrap();
        let (artifact, summary) = snapshotter.encode_tree(&file).unwrap();
        assert_eq!(summary.records_written(), 1);

        snapshotter.restore_artifact(&artifact, restored.path()).unwrap();
        assert_eq!(
            fs::read_to_string(restored.path().join("notes.md")).unwrap(),
            "# Notes\n"
        );
    }

    #[test]
    fn test_zero_byte_files() {
        let source = TempDir::new().unwrap();
        let restored = TempDir::new().unwrap();
        fs::write(source.path().join("empty.txt"), "").unwrap();
        fs::write(source.path().join("empty.bin"), "").unwrap();

        for framing in [FramingKind::Verbose, FramingKind::Compact] {
            let snapshotter = Snapshotter::builder()
                .framing(framing)
                .backup_existing(false)
                .build()
                .unwrap();
            let (artifact, _) = snapshotter.encode_tree(source.path()).unwrap();
            let result = snapshotter.restore_artifact(&artifact, restored.path()).unwrap();
            assert_eq!(result.files_restored, 2, "{:?}", framing);
            assert_eq!(fs::read(restored.path().join("empty.bin")).unwrap(), b"");
            assert_eq!(fs::read(restored.path().join("empty.txt")).unwrap(), b"");
        }
    }

    #[test]
    fn test_garbage_input_is_rejected() {
        let snapshotter = Snapshotter::builder().build().unwrap();
        let result = snapshotter.decode_artifact(b"this is not an artifact\nat all\n");
        assert!(matches!(result, Err(SnapshotError::UnrecognizedFormat(_))));
    }

    #[test]
    fn test_unknown_codec_is_fatal() {
        let snapshotter = Snapshotter::builder().build().unwrap();
        let result = snapshotter.decode_artifact(b"COMPRESSED\nzstd:abcdef\n");
        assert!(matches!(result, Err(SnapshotError::UnsupportedCodec(_))));
    }
}
