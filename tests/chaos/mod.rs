//! Chaos testing for foldsnap
//!
//! Damages artifacts the way transfers and careless edits do (cutting them
//! short, flipping bytes, pasting garbage in) and checks that decoding never
//! panics, keeps everything that survived, and that restoring the wreckage
//! never writes outside the destination.

use crate::integration::FileGenerator;
use ::foldsnap::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

/// Seeded source of damage
pub struct ChaosEngine {
    rng: StdRng,
}

impl ChaosEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Random cut points in `0..=len`, always including both ends
    pub fn cut_points(&mut self, len: usize, count: usize) -> Vec<usize> {
        let mut points = vec![0, len];
        for _ in 0..count {
            points.push(self.rng.random_range(0..=len));
        }
        points.sort_unstable();
        points.dedup();
        points
    }

    /// Flip random bytes at or after `from`
    pub fn corrupt(&mut self, data: &[u8], from: usize, flips: usize) -> Vec<u8> {
        let mut damaged = data.to_vec();
        if from >= damaged.len() {
            return damaged;
        }
        for _ in 0..flips {
            let at = self.rng.random_range(from..damaged.len());
            damaged[at] = self.rng.random();
        }
        damaged
    }

    /// Insert a run of random printable noise at or after `from`
    pub fn splice_noise(&mut self, data: &[u8], from: usize, len: usize) -> Vec<u8> {
        let at = self.rng.random_range(from.min(data.len())..=data.len());
        let noise: Vec<u8> = (0..len)
            .map(|_| self.rng.random_range(b' '..=b'~'))
            .collect();
        let mut damaged = data[..at].to_vec();
        damaged.extend_from_slice(&noise);
        damaged.extend_from_slice(&data[at..]);
        damaged
    }
}

/// A small tree with text, binary, empty files and an empty directory
pub fn chaos_tree(seed: u64) -> TempDir {
    let dir = TempDir::new().unwrap();
    let mut generator = FileGenerator::new(seed);
    fs::create_dir_all(dir.path().join("src/nested")).unwrap();
    fs::create_dir_all(dir.path().join("empty")).unwrap();
    fs::write(dir.path().join("README.md"), "# Chaos\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "a line of notes\n".repeat(120)).unwrap();
    fs::write(dir.path().join("src/lib.rs"), generator.source_text(30)).unwrap();
    fs::write(dir.path().join("src/nested/data.bin"), generator.binary(300)).unwrap();
    fs::write(dir.path().join("src/nested/zero.txt"), "").unwrap();
    fs::write(dir.path().join("style.css"), "@media print {\n  a { color: black }\n}\n").unwrap();
    dir
}

/// Length of the header line, newline included
fn header_len(artifact: &[u8]) -> usize {
    artifact
        .iter()
        .position(|&b| b == b'\n')
        .map_or(artifact.len(), |i| i + 1)
}

/// Restore into `<outer>/dest` and check nothing landed beside it
fn restore_contained(entries: &[TreeEntry]) {
    let outer = TempDir::new().unwrap();
    let dest = outer.path().join("dest");
    let result = Restorer::new(dest.clone())
        .with_backups(false)
        .restore(entries)
        .unwrap();
    assert!(result.processed() <= entries.len());
    let siblings: Vec<_> = fs::read_dir(outer.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(siblings, vec![std::ffi::OsString::from("dest")]);
}

fn snapshot(framing: FramingKind, compress: bool) -> Snapshotter {
    Snapshotter::builder()
        .framing(framing)
        .compress(compress)
        .backup_existing(false)
        .build()
        .unwrap()
}

fn encode(source: &Path, framing: FramingKind, compress: bool) -> (Snapshotter, Vec<u8>, Vec<TreeEntry>) {
    let snapshotter = snapshot(framing, compress);
    let (artifact, _) = snapshotter.encode_tree(source).unwrap();
    let original = snapshotter.decode_artifact(&artifact).unwrap().entries;
    (snapshotter, artifact, original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_verbose_truncation_keeps_exact_prefix() {
        let source = chaos_tree(1);
        let (snapshotter, artifact, original) = encode(source.path(), FramingKind::Verbose, false);
        assert_eq!(original.len(), 9);

        let mut chaos = ChaosEngine::new(11);
        for cut in chaos.cut_points(artifact.len(), 200) {
            let outcome = snapshotter.decode_artifact(&artifact[..cut]).unwrap();
            let n = outcome.entries.len();
            assert_eq!(outcome.entries[..], original[..n], "cut at {}", cut);
            if cut == artifact.len() {
                assert!(outcome.report.is_clean());
                assert_eq!(n, original.len());
            }
            assert_eq!(outcome.report.failed(), 0, "cut at {}", cut);
        }
    }

    #[test]
    fn test_compact_truncation_keeps_all_but_last() {
        let source = chaos_tree(2);
        let (snapshotter, artifact, original) = encode(source.path(), FramingKind::Compact, false);

        let mut chaos = ChaosEngine::new(22);
        for cut in chaos.cut_points(artifact.len(), 200) {
            let outcome = snapshotter.decode_artifact(&artifact[..cut]).unwrap();
            let n = outcome.entries.len();
            assert!(n <= original.len(), "cut at {}", cut);
            let settled = n.saturating_sub(1);
            assert_eq!(outcome.entries[..settled], original[..settled], "cut at {}", cut);
        }
    }

    #[test]
    fn test_compressed_truncation_never_fails() {
        let source = chaos_tree(3);
        for framing in [FramingKind::Verbose, FramingKind::Compact] {
            let (snapshotter, artifact, original) = encode(source.path(), framing, true);

            let mut chaos = ChaosEngine::new(33);
            for cut in chaos.cut_points(artifact.len(), 60) {
                let outcome = snapshotter.decode_artifact(&artifact[..cut]).unwrap();
                assert!(outcome.entries.len() <= original.len());
                if framing == FramingKind::Verbose {
                    let n = outcome.entries.len();
                    assert_eq!(outcome.entries[..], original[..n], "cut at {}", cut);
                }
            }
        }
    }

    #[test]
    #[traced_test]
    fn test_corrupted_streams_decode_and_restore_safely() {
        let source = chaos_tree(4);
        let mut chaos = ChaosEngine::new(44);

        for framing in [FramingKind::Verbose, FramingKind::Compact] {
            let (snapshotter, artifact, _) = encode(source.path(), framing, false);
            let body_start = header_len(&artifact);

            for round in 0..40 {
                let damaged = chaos.corrupt(&artifact, body_start, 1 + round % 8);
                let outcome = snapshotter.decode_artifact(&damaged).unwrap();
                info!(
                    "{:?} round {}: {} entries, {} failed",
                    framing,
                    round,
                    outcome.entries.len(),
                    outcome.report.failed()
                );
                restore_contained(&outcome.entries);
            }
        }
        assert!(logs_contain("Compact round 39"));
    }

    #[test]
    fn test_corrupted_compressed_payload_is_contained() {
        let source = chaos_tree(5);
        let mut chaos = ChaosEngine::new(55);
        let (snapshotter, artifact, _) = encode(source.path(), FramingKind::Verbose, true);
        let outcome = snapshotter.decode_artifact(&artifact).unwrap();
        // Corrupting an LZ4 size prefix could ask for a huge allocation
        assert_ne!(outcome.codec, Some(CodecTag::Lz4));

        let container = header_len(&artifact);
        let payload_start = container
            + artifact[container..]
                .iter()
                .position(|&b| b == b':')
                .unwrap()
            + 1;

        for round in 0..30 {
            let damaged = chaos.corrupt(&artifact, payload_start, 1 + round % 4);
            let outcome = snapshotter.decode_artifact(&damaged).unwrap();
            restore_contained(&outcome.entries);
        }
    }

    #[test]
    fn test_spliced_noise_only_costs_nearby_records() {
        let source = chaos_tree(6);
        let (snapshotter, artifact, original) = encode(source.path(), FramingKind::Verbose, false);
        let mut chaos = ChaosEngine::new(66);

        for _ in 0..30 {
            let damaged = chaos.splice_noise(&artifact, header_len(&artifact), 16);
            let outcome = snapshotter.decode_artifact(&damaged).unwrap();
            let survivors = outcome
                .entries
                .iter()
                .filter(|e| original.contains(e))
                .count();
            // Noise lands inside at most one record, which can take its neighbor with it
            assert!(survivors + 2 >= original.len(), "{} of {}", survivors, original.len());
        }
    }

    #[test]
    fn test_header_damage_is_an_error_not_a_panic() {
        let source = chaos_tree(7);
        let (snapshotter, artifact, _) = encode(source.path(), FramingKind::Verbose, false);

        let mut damaged = artifact.clone();
        damaged[0] = b'#';
        assert!(matches!(
            snapshotter.decode_artifact(&damaged),
            Err(SnapshotError::UnrecognizedFormat(_))
        ));

        let mut prefix_only = b"UNCOMP".to_vec();
        let outcome = snapshotter.decode_artifact(&prefix_only).unwrap();
        assert!(outcome.report.truncated);
        prefix_only.clear();
        assert!(snapshotter.decode_artifact(&prefix_only).unwrap().entries.is_empty());
    }
}
