//! Snapshot verification against a live source tree
//!
//! A snapshot is checked by decoding it, walking the source it was taken
//! from and comparing the two path by path:
//!
//! 1. **Presence**: paths only in the source, paths only in the snapshot
//! 2. **Kind**: a directory on one side and a file on the other
//! 3. **Content**: SHA-256 digests of file bytes; text files are compared
//!    ignoring a single trailing newline, which the framings do not preserve
//!    reliably
//! 4. **Decoding**: any loss the decoder reported (truncation, skipped records)
//!
//! Error entries on either side cannot be compared and are listed separately.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use foldsnap::Snapshotter;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshotter = Snapshotter::builder().build()?;
//! let artifact = std::fs::read("snapshot_project.txt")?;
//! let report = snapshotter.verify(&artifact, Path::new("./project"))?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::types::{DecodeOutcome, DecodeReport, EncodingHint, EntryKind, TreeEntry};
use crate::utils;
use crate::walker::TreeWalker;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info};

/// Compares decoded snapshot entries with a source tree
#[derive(Debug)]
pub struct SnapshotVerifier<'a> {
    walker: &'a TreeWalker,
}

impl<'a> SnapshotVerifier<'a> {
    /// Create a verifier that walks the source with `walker`
    pub fn new(walker: &'a TreeWalker) -> Self {
        Self { walker }
    }

    /// Compare a decoded snapshot with the walker's current tree
    ///
    /// # Errors
    ///
    /// Only a source root that cannot be walked is an error. Differences are
    /// reported in the result.
    pub fn verify(&self, outcome: &DecodeOutcome) -> Result<VerificationReport> {
        let start = Instant::now();
        debug!("Walking {:?} for verification", self.walker.root());
        let source = self.walker.walk()?;

        let mut report = compare_entries(&outcome.entries, &source);
        report.decode = outcome.report.clone();
        report.verification_time_ms = start.elapsed().as_millis() as u64;

        info!(
            "Verified snapshot against {:?} in {}ms: {} / {} paths match",
            self.walker.root(),
            report.verification_time_ms,
            report.matched,
            report.snapshot_entries
        );
        Ok(report)
    }
}

/// A path that is a directory on one side and a file on the other
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindMismatch {
    /// Relative path
    pub path: String,
    /// Kind recorded in the snapshot
    pub snapshot: &'static str,
    /// Kind found in the source
    pub source: &'static str,
}

/// A file whose bytes differ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMismatch {
    /// Relative path
    pub path: String,
    /// Digest of the snapshot copy
    pub snapshot_hash: String,
    /// Digest of the source copy
    pub source_hash: String,
}

/// Outcome of comparing a snapshot with its source
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    /// Entries decoded from the snapshot
    pub snapshot_entries: usize,
    /// Entries found in the source
    pub source_entries: usize,
    /// Paths identical on both sides
    pub matched: usize,
    /// In the source but not in the snapshot
    pub missing_from_snapshot: Vec<String>,
    /// In the snapshot but no longer in the source
    pub extra_in_snapshot: Vec<String>,
    /// Directory/file disagreements
    pub kind_mismatches: Vec<KindMismatch>,
    /// Files whose content differs
    pub content_mismatches: Vec<ContentMismatch>,
    /// Paths with an error entry on either side
    pub unverified: Vec<String>,
    /// How the snapshot decoded
    pub decode: DecodeReport,
    /// Time taken in milliseconds
    pub verification_time_ms: u64,
}

impl VerificationReport {
    /// Whether the snapshot matches the source exactly and decoded cleanly
    pub fn is_valid(&self) -> bool {
        self.missing_from_snapshot.is_empty()
            && self.extra_in_snapshot.is_empty()
            && self.kind_mismatches.is_empty()
            && self.content_mismatches.is_empty()
            && self.decode.is_clean()
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        if self.is_valid() {
            return format!(
                "Snapshot matches source ({} entries verified in {}ms)",
                self.matched, self.verification_time_ms
            );
        }

        let issues = [
            (!self.missing_from_snapshot.is_empty())
                .then(|| format!("{} missing", self.missing_from_snapshot.len())),
            (!self.extra_in_snapshot.is_empty())
                .then(|| format!("{} extra", self.extra_in_snapshot.len())),
            (!self.kind_mismatches.is_empty())
                .then(|| format!("{} kind mismatches", self.kind_mismatches.len())),
            (!self.content_mismatches.is_empty())
                .then(|| format!("{} content mismatches", self.content_mismatches.len())),
            self.decode.truncated.then(|| "snapshot truncated".to_string()),
            (self.decode.failed() > 0)
                .then(|| format!("{} damaged records", self.decode.failed())),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(", ");

        format!(
            "Snapshot differs from source: {} ({}/{} entries match)",
            issues, self.matched, self.snapshot_entries
        )
    }
}

/// Compare two entry lists by path
///
/// Decode counts are left empty; [`SnapshotVerifier::verify`] fills them in.
pub fn compare_entries(snapshot: &[TreeEntry], source: &[TreeEntry]) -> VerificationReport {
    let mut report = VerificationReport {
        snapshot_entries: snapshot.len(),
        source_entries: source.len(),
        ..Default::default()
    };

    let source_by_path: BTreeMap<&str, &TreeEntry> = source
        .iter()
        .map(|e| (e.relative_path.as_str(), e))
        .collect();
    let snapshot_by_path: BTreeMap<&str, &TreeEntry> = snapshot
        .iter()
        .map(|e| (e.relative_path.as_str(), e))
        .collect();

    for (path, snap) in &snapshot_by_path {
        let Some(live) = source_by_path.get(path) else {
            report.extra_in_snapshot.push(path.to_string());
            continue;
        };

        match (&snap.kind, &live.kind) {
            (EntryKind::EnumerationError { .. }, _) | (_, EntryKind::EnumerationError { .. }) => {
                report.unverified.push(path.to_string());
            }
            (EntryKind::Directory, EntryKind::Directory) => report.matched += 1,
            (
                EntryKind::File {
                    content: ours,
                    encoding,
                },
                EntryKind::File { content: theirs, .. },
            ) => {
                let (snapshot_hash, source_hash) = match encoding {
                    EncodingHint::Text => (utils::hash_text(ours), utils::hash_text(theirs)),
                    EncodingHint::Binary => (utils::hash_data(ours), utils::hash_data(theirs)),
                };
                if snapshot_hash == source_hash {
                    report.matched += 1;
                } else {
                    report.content_mismatches.push(ContentMismatch {
                        path: path.to_string(),
                        snapshot_hash,
                        source_hash,
                    });
                }
            }
            (ours, theirs) => report.kind_mismatches.push(KindMismatch {
                path: path.to_string(),
                snapshot: ours.label(),
                source: theirs.label(),
            }),
        }
    }

    report.missing_from_snapshot = source_by_path
        .keys()
        .filter(|path| !snapshot_by_path.contains_key(*path))
        .map(|path| path.to_string())
        .collect();

    report
}
