//! Main Snapshotter implementation
//!
//! [`Snapshotter`] ties the pipeline together: walk a tree, frame its entries,
//! optionally compress, wrap the result in an artifact, and back again.
//! Instances are configured through [`SnapshotBuilder`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use foldsnap::{FramingKind, Snapshotter};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshotter = Snapshotter::builder()
//!     .compress(true)
//!     .framing(FramingKind::Verbose)
//!     .exclude_patterns(vec!["target".to_string(), "*.log".to_string()])
//!     .build()?;
//!
//! let (path, summary) = snapshotter.write_snapshot(Path::new("./project"), Path::new("."))?;
//! println!("Wrote {:?}: {} records", path, summary.records_written());
//!
//! let result = snapshotter.restore_file(&path, Path::new("./restored"))?;
//! println!("Restored {} files", result.files_restored);
//! # Ok(())
//! # }
//! ```

use crate::artifact;
use crate::classify::{ClassifierPolicy, ContentClassifier};
use crate::clock::{Clock, SystemClock};
use crate::compression::{default_strategies, Codec, CompressionDispatcher};
use crate::error::{Result, SnapshotError};
use crate::restore::Restorer;
use crate::sanitize::sanitize_segment;
use crate::stream::StreamWriter;
use crate::types::{
    DecodeOutcome, EncodeSummary, FramingKind, ProgressCallback, ProgressInfo, RestoreResult,
    SnapshotConfig, TreeEntry,
};
use crate::utils;
use crate::verification::{SnapshotVerifier, VerificationReport};
use crate::walker::{TreeWalker, WalkKind};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Packs directory trees into artifacts and restores them
///
/// Each operation is independent; a `Snapshotter` holds configuration only
/// and can be reused for any number of trees.
pub struct Snapshotter {
    config: SnapshotConfig,
    classifier: ContentClassifier,
    dispatcher: CompressionDispatcher,
    clock: Arc<dyn Clock>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Snapshotter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshotter")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("clock", &self.clock)
            .finish()
    }
}

impl Snapshotter {
    /// Start configuring a snapshotter
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::new()
    }

    /// Build a snapshotter from a configuration
    pub fn from_config(config: SnapshotConfig) -> Result<Self> {
        SnapshotBuilder::from_config(config).build()
    }

    /// Active configuration
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    fn walker(&self, root: &Path) -> Result<TreeWalker> {
        // Backups made by earlier restores never go into a snapshot
        let mut patterns = self.config.exclude_patterns.clone();
        patterns.push(self.config.backup_dir_name.clone());

        Ok(TreeWalker::new(root.to_path_buf())
            .with_exclude_patterns(patterns)?
            .with_max_file_size(self.config.max_file_size)
            .with_follow_symlinks(self.config.follow_symlinks)
            .with_classifier(self.classifier.clone()))
    }

    fn report(&self, info: ProgressInfo) {
        if let Some(callback) = &self.progress {
            callback(info);
        }
    }

    /// Walk `root` and frame every entry into `sink`
    fn pack_into<W: Write>(&self, root: &Path, sink: W) -> Result<(W, EncodeSummary)> {
        let walker = self.walker(root)?;
        let items = walker.list()?;
        let total = items.len();
        let total_bytes: u64 = items
            .iter()
            .map(|item| match item.kind {
                WalkKind::File { size } => size,
                _ => 0,
            })
            .sum();
        debug!("Packing {} nodes ({} bytes)", total, total_bytes);

        let mut writer = StreamWriter::new(sink, self.config.framing);
        for (i, item) in items.iter().enumerate() {
            let entry = walker.load(item);
            writer.write_entry(&entry)?;
            self.report(ProgressInfo {
                operation: "Packing".to_string(),
                current_item: Some(item.relative_path.clone()),
                processed: i + 1,
                total: Some(total),
                bytes_processed: writer.summary().bytes_in,
                total_bytes: Some(total_bytes),
            });
        }
        writer.finish()
    }

    /// Encode already walked entries into an artifact
    pub fn encode_entries(&self, entries: &[TreeEntry]) -> Result<(Vec<u8>, EncodeSummary)> {
        let start = Instant::now();
        let mut writer = StreamWriter::new(Vec::new(), self.config.framing);
        for entry in entries {
            writer.write_entry(entry)?;
        }
        let (stream, summary) = writer.finish()?;
        self.wrap(stream, summary, start)
    }

    fn wrap(
        &self,
        stream: Vec<u8>,
        mut summary: EncodeSummary,
        start: Instant,
    ) -> Result<(Vec<u8>, EncodeSummary)> {
        let artifact = if self.config.compress {
            let (payload, stats) = self.dispatcher.compress(&stream)?;
            info!(
                "Compressed {} stream bytes to {} with {} ({:.1}%)",
                stats.input_bytes,
                stats.output_bytes,
                payload.tag,
                stats.ratio() * 100.0
            );
            summary.codec = Some(payload.tag);
            summary.compression = Some(stats);
            artifact::compressed_artifact(&payload)
        } else {
            artifact::uncompressed_artifact(&stream)
        };

        summary.artifact_bytes = artifact.len() as u64;
        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok((artifact, summary))
    }

    /// Pack the tree at `root` into artifact bytes
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::SourceNotFound`] if `root` does not exist
    /// - [`SnapshotError::Compression`] if no codec can store the stream
    ///
    /// Unreadable nodes are packed as error records, not returned as errors.
    #[instrument(skip(self))]
    pub fn encode_tree(&self, root: &Path) -> Result<(Vec<u8>, EncodeSummary)> {
        let start = Instant::now();
        let (stream, summary) = self.pack_into(root, Vec::new())?;
        let (artifact, summary) = self.wrap(stream, summary, start)?;

        info!(
            "Packed {:?}: {} records ({} skipped) into {} in {}ms",
            root,
            summary.records_written(),
            summary.skipped,
            utils::format_bytes(summary.artifact_bytes),
            summary.duration_ms
        );
        Ok((artifact, summary))
    }

    /// Pack `root` into `output_dir`, named after the root
    ///
    /// The file is `snapshot_<name>.txt`, or `compressed_snapshot_<name>.txt`
    /// when compressing, with a `_N` suffix if that name is taken. It is
    /// written atomically.
    #[instrument(skip(self))]
    pub fn write_snapshot(&self, root: &Path, output_dir: &Path) -> Result<(PathBuf, EncodeSummary)> {
        let name = root
            .canonicalize()
            .ok()
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| sanitize_segment(&n.to_string_lossy()))
            .unwrap_or_else(|| "root".to_string());

        let (artifact, summary) = self.encode_tree(root)?;

        fs::create_dir_all(output_dir).map_err(|e| SnapshotError::filesystem(output_dir, e))?;
        let target = utils::unique_path(
            &output_dir.join(utils::snapshot_file_name(&name, self.config.compress)),
        );
        utils::atomic_write(&target, &artifact)?;

        info!("Snapshot written to {:?}", target);
        Ok((target, summary))
    }

    /// Stream an uncompressed artifact of `root` into `sink`
    ///
    /// Records are written as the tree is walked, so only one file is held in
    /// memory at a time. Compression needs the whole stream and is not applied
    /// here, whatever the configuration says.
    #[instrument(skip(self, sink))]
    pub fn stream_to<W: Write>(&self, root: &Path, mut sink: W) -> Result<(W, EncodeSummary)> {
        let start = Instant::now();
        artifact::write_uncompressed_header(&mut sink)?;
        let header_bytes = artifact::UNCOMPRESSED_HEADER.len() as u64 + 1;

        let (sink, mut summary) = self.pack_into(root, sink)?;
        summary.artifact_bytes = header_bytes + summary.stream_bytes;
        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok((sink, summary))
    }

    /// Decode artifact bytes of any supported layout
    pub fn decode_artifact(&self, bytes: &[u8]) -> Result<DecodeOutcome> {
        artifact::decode_artifact(bytes)
    }

    /// Decode `bytes` and restore them under `destination`
    ///
    /// # Errors
    ///
    /// Fatal decode errors ([`SnapshotError::UnrecognizedFormat`],
    /// [`SnapshotError::UnsupportedCodec`]) and an uncreatable destination.
    /// Everything that goes wrong per entry is in the result.
    #[instrument(skip(self, bytes))]
    pub fn restore_artifact(&self, bytes: &[u8], destination: &Path) -> Result<RestoreResult> {
        let start = Instant::now();
        let outcome = self.decode_artifact(bytes)?;
        if !outcome.report.is_clean() {
            info!(
                "Artifact decoded with losses: {} failed records, truncated={}",
                outcome.report.failed(),
                outcome.report.truncated
            );
        }

        let mut restorer = Restorer::new(destination.to_path_buf())
            .with_backups(self.config.backup_existing)
            .with_backup_dir_name(self.config.backup_dir_name.clone())
            .with_clock(Arc::clone(&self.clock));
        if let Some(callback) = &self.progress {
            restorer = restorer.with_progress(Arc::clone(callback));
        }

        let mut result = restorer.restore(&outcome.entries)?;
        result.decode = outcome.report;
        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Read an artifact file and restore it under `destination`
    #[instrument(skip(self))]
    pub fn restore_file(&self, artifact_path: &Path, destination: &Path) -> Result<RestoreResult> {
        let bytes = fs::read(artifact_path)
            .map_err(|e| SnapshotError::filesystem(artifact_path, e))?;
        self.restore_artifact(&bytes, destination)
    }

    /// Compare an artifact with the tree it was taken from
    #[instrument(skip(self, bytes))]
    pub fn verify(&self, bytes: &[u8], source_root: &Path) -> Result<VerificationReport> {
        let outcome = self.decode_artifact(bytes)?;
        let walker = self.walker(source_root)?;
        SnapshotVerifier::new(&walker).verify(&outcome)
    }
}

/// Builder for configuring a [`Snapshotter`]
///
/// # Examples
///
/// ```rust
/// use foldsnap::{FramingKind, SnapshotBuilder};
///
/// let snapshotter = SnapshotBuilder::new()
///     .compress(true)
///     .framing(FramingKind::Compact)
///     .race_threshold(4096)
///     .max_file_size(10 * 1024 * 1024)
///     .build()
///     .unwrap();
/// assert!(snapshotter.config().compress);
/// ```
pub struct SnapshotBuilder {
    config: SnapshotConfig,
    strategies: Option<Vec<Box<dyn Codec>>>,
    clock: Arc<dyn Clock>,
    progress: Option<ProgressCallback>,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self::from_config(SnapshotConfig::default())
    }

    /// Start from an existing configuration
    pub fn from_config(config: SnapshotConfig) -> Self {
        Self {
            config,
            strategies: None,
            clock: Arc::new(SystemClock),
            progress: None,
        }
    }

    /// Compress artifacts
    pub fn compress(mut self, enabled: bool) -> Self {
        self.config.compress = enabled;
        self
    }

    /// Record framing for new artifacts
    pub fn framing(mut self, framing: FramingKind) -> Self {
        self.config.framing = framing;
        self
    }

    /// Streams shorter than this skip the codec race and use LZ4
    pub fn race_threshold(mut self, bytes: usize) -> Self {
        self.config.race_threshold = bytes;
        self
    }

    /// Codecs raced when compressing, highest priority first
    ///
    /// Defaults to XZ, BZ2, zlib.
    pub fn compression_strategies(mut self, strategies: Vec<Box<dyn Codec>>) -> Self {
        self.strategies = Some(strategies);
        self
    }

    /// Glob patterns excluded from the walk
    ///
    /// The backup directory is always excluded as well.
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.config.exclude_patterns = patterns;
        self
    }

    /// Maximum file size to pack (0 = unlimited)
    ///
    /// Larger files are packed as error records.
    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    /// Follow symbolic links instead of packing them as error records
    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.config.follow_symlinks = follow;
        self
    }

    /// Text/binary classification thresholds
    pub fn classifier_policy(mut self, policy: ClassifierPolicy) -> Self {
        self.config.classifier = policy;
        self
    }

    /// Copy existing files aside before a restore overwrites them
    pub fn backup_existing(mut self, enabled: bool) -> Self {
        self.config.backup_existing = enabled;
        self
    }

    /// Name of the backup directory created under a restore destination
    pub fn backup_dir_name(mut self, name: impl Into<String>) -> Self {
        self.config.backup_dir_name = name.into();
        self
    }

    /// Time source for backup directory names
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Progress callback fired per packed and per restored entry
    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Validate the configuration and build the snapshotter
    ///
    /// # Errors
    ///
    /// - [`SnapshotError::InvalidConfiguration`] for out-of-range settings
    /// - [`SnapshotError::InvalidPattern`] for an exclude pattern that does not compile
    pub fn build(self) -> Result<Snapshotter> {
        self.config.validate()?;
        // Compile the patterns once so a bad one fails here, not mid-walk
        TreeWalker::new(PathBuf::new()).with_exclude_patterns(self.config.exclude_patterns.clone())?;

        let strategies = self.strategies.unwrap_or_else(default_strategies);
        let dispatcher = CompressionDispatcher::new(strategies, self.config.race_threshold);
        debug!(
            "Snapshotter ready: framing={:?}, compress={}, strategies={:?}",
            self.config.framing,
            self.config.compress,
            dispatcher.strategy_tags()
        );

        Ok(Snapshotter {
            classifier: ContentClassifier::new(self.config.classifier.clone()),
            config: self.config,
            dispatcher,
            clock: self.clock,
            progress: self.progress,
        })
    }
}
