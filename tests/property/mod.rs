//! Property-based testing for foldsnap
//!
//! Uses proptest to check the round-trip, compression and path-safety
//! invariants over randomly generated trees and inputs.

use crate::integration::assert_trees_equal;
use ::foldsnap::compression::{codec_for, CompressionDispatcher};
use ::foldsnap::sanitize::sanitize_relative_path;
use ::foldsnap::*;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};
use tempfile::TempDir;

/// Directory components never contain a dot, file names always do, so a
/// generated file can never collide with a generated directory
fn dir_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("d[a-z0-9]{0,6}", 0..=3)
}

/// The `f` prefix keeps clear of reserved device names, which restore renames
fn file_name_strategy() -> impl Strategy<Value = String> {
    "f[a-z0-9_]{0,7}\\.(txt|rs|md|bin)"
}

/// Random file content: plain text, marker-heavy text, or raw bytes
fn content_strategy() -> impl Strategy<Value = (Vec<u8>, EncodingHint)> {
    let tricky_line = prop_oneof![
        Just("@media screen {".to_string()),
        Just("@Override".to_string()),
        Just("@src/other.txt".to_string()),
        Just("!important".to_string()),
        Just("--- entry ---".to_string()),
        Just("[EMPTY_DIRECTORY]".to_string()),
        Just("B".to_string()),
        "\\PC{0,40}",
    ];
    prop_oneof![
        "(\\PC|\n){0,200}".prop_map(|s| (s.into_bytes(), EncodingHint::Text)),
        prop::collection::vec(tricky_line, 0..12)
            .prop_map(|lines| (lines.join("\n").into_bytes(), EncodingHint::Text)),
        prop::collection::vec(any::<u8>(), 0..600).prop_map(|b| (b, EncodingHint::Binary)),
    ]
}

/// A list of entries with unique paths, every file's parents listed before it
fn entries_strategy() -> impl Strategy<Value = Vec<TreeEntry>> {
    prop::collection::vec(
        (dir_strategy(), file_name_strategy(), content_strategy()),
        0..12,
    )
    .prop_map(|files| {
        let mut tree: BTreeMap<String, Option<(Vec<u8>, EncodingHint)>> = BTreeMap::new();
        for (dirs, name, content) in files {
            let mut prefix = String::new();
            for dir in dirs {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(&dir);
                tree.entry(prefix.clone()).or_insert(None);
            }
            let path = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            tree.insert(path, Some(content));
        }
        tree.into_iter()
            .map(|(path, node)| match node {
                None => TreeEntry::directory(path),
                Some((content, hint)) => TreeEntry::file(path, content, hint),
            })
            .collect()
    })
}

/// Path, kind label and content; encoding hints may change on the way through
fn shape(entries: &[TreeEntry]) -> Vec<(String, &'static str, Option<Vec<u8>>)> {
    entries
        .iter()
        .map(|e| {
            (
                e.relative_path.clone(),
                e.kind.label(),
                e.content().map(|c| c.to_vec()),
            )
        })
        .collect()
}

fn snapshotter(framing: FramingKind, compress: bool) -> Snapshotter {
    Snapshotter::builder()
        .framing(framing)
        .compress(compress)
        .race_threshold(256)
        .backup_existing(false)
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_verbose_roundtrip_is_exact(entries in entries_strategy()) {
        let snapshotter = snapshotter(FramingKind::Verbose, false);
        let (artifact, summary) = snapshotter.encode_entries(&entries).unwrap();
        prop_assert_eq!(summary.skipped, 0);

        let outcome = snapshotter.decode_artifact(&artifact).unwrap();
        prop_assert!(outcome.report.is_clean());
        prop_assert_eq!(shape(&outcome.entries), shape(&entries));
    }

    #[test]
    fn prop_compact_roundtrip_preserves_content(entries in entries_strategy()) {
        let snapshotter = snapshotter(FramingKind::Compact, false);
        let (artifact, summary) = snapshotter.encode_entries(&entries).unwrap();
        prop_assert_eq!(summary.skipped, 0);

        let outcome = snapshotter.decode_artifact(&artifact).unwrap();
        prop_assert!(outcome.report.is_clean(), "{:?}", outcome.report.warnings);
        prop_assert_eq!(shape(&outcome.entries), shape(&entries));
    }

    #[test]
    fn prop_any_prefix_decodes(entries in entries_strategy(), fraction in 0.0f64..=1.0) {
        for framing in [FramingKind::Verbose, FramingKind::Compact] {
            let snapshotter = snapshotter(framing, false);
            let (artifact, _) = snapshotter.encode_entries(&entries).unwrap();
            let cut = (artifact.len() as f64 * fraction) as usize;
            let outcome = snapshotter.decode_artifact(&artifact[..cut]).unwrap();
            prop_assert!(outcome.entries.len() <= entries.len());
        }
    }

    #[test]
    fn prop_codecs_are_transparent(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        for tag in CodecTag::ALL {
            let codec = codec_for(tag);
            let packed = codec.compress(&data).unwrap();
            prop_assert_eq!(&codec.decompress(&packed).unwrap(), &data, "codec {}", tag);
        }
    }

    #[test]
    fn prop_selection_is_deterministic(text in "(\\PC|\n){0,3000}") {
        let dispatcher = CompressionDispatcher::with_threshold(512);
        let (first, stats) = dispatcher.compress(text.as_bytes()).unwrap();
        let (second, _) = dispatcher.compress(text.as_bytes()).unwrap();
        prop_assert_eq!(&first, &second);

        // The winner is never larger than any successful candidate
        for candidate in &stats.candidates {
            if let Some(size) = candidate.encoded_size {
                prop_assert!(first.payload.len() <= size);
            }
        }

        let restored = CompressionDispatcher::decompress(first.tag.as_str(), &first.payload).unwrap();
        prop_assert_eq!(restored, text.into_bytes());
    }

    #[test]
    fn prop_sanitized_paths_stay_inside(path in "(\\PC|/|\\\\|\\.\\.){0,80}") {
        if let Ok(clean) = sanitize_relative_path(&path) {
            prop_assert!(clean.components().all(|c| matches!(c, Component::Normal(_))));
            let root = Path::new("/restore/root");
            prop_assert!(root.join(&clean).starts_with(root));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_filesystem_roundtrip(entries in entries_strategy(), compress in any::<bool>()) {
        let source = TempDir::new().unwrap();
        for entry in &entries {
            let path = source.path().join(&entry.relative_path);
            match entry.content() {
                Some(content) => fs::write(&path, content).unwrap(),
                None => fs::create_dir_all(&path).unwrap(),
            }
        }

        for framing in [FramingKind::Verbose, FramingKind::Compact] {
            let destination = TempDir::new().unwrap();
            let snapshotter = snapshotter(framing, compress);
            let (artifact, summary) = snapshotter.encode_tree(source.path()).unwrap();
            prop_assert_eq!(summary.records_written(), entries.len());

            let result = snapshotter.restore_artifact(&artifact, destination.path()).unwrap();
            prop_assert!(result.failures.is_empty());
            assert_trees_equal(source.path(), destination.path());

            let report = snapshotter.verify(&artifact, source.path()).unwrap();
            prop_assert!(report.is_valid(), "{}", report.summary());
        }
    }
}
