//! # foldsnap - Directory trees as single text artifacts
//!
//! Packs an entire directory tree (files, empty directories and markers for
//! unreadable nodes) into one text artifact, and restores the tree from it
//! byte for byte.
//!
//! ## Overview
//!
//! A snapshot goes through these stages:
//!
//! - **Walk**: the tree is enumerated depth-first, siblings sorted by name,
//!   every directory emitted before its contents
//! - **Classify**: each file is judged text or binary; binary content is
//!   re-encoded as base-64
//! - **Frame**: entries become self-describing records in one stream
//! - **Compress** (optional): XZ, BZ2 and zlib race over the stream, each
//!   result is base-85 encoded and the smallest wins; small streams use LZ4
//! - **Wrap**: a header line tells readers which layout follows
//!
//! Restoring reverses this. The decoder never aborts on a damaged record; it
//! skips it, counts it and keeps going, and a cut-off artifact yields every
//! entry before the cut.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use foldsnap::Snapshotter;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let snapshotter = Snapshotter::builder().compress(true).build()?;
//!
//! let (artifact, summary) = snapshotter.encode_tree(Path::new("./my_project"))?;
//! println!("{} records, {} bytes", summary.records_written(), artifact.len());
//!
//! let result = snapshotter.restore_artifact(&artifact, Path::new("./restored"))?;
//! println!("Restored {} files", result.files_restored);
//! # Ok(())
//! # }
//! ```
//!
//! ## Framings
//!
//! Two record framings share one decoder, which sniffs the framing from the
//! first bytes of the stream:
//!
//! - **Verbose** (default): a separator line, a JSON metadata line and a
//!   payload of declared length. Unambiguous for any content.
//! - **Compact**: `\n@path\n` markers before inline content. Smaller, but
//!   text that could be mistaken for a marker has to be escaped to binary.
//!
//! Artifacts written by older versions of the tool are read as well (see
//! [`artifact`]).
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SnapshotError>`. Errors that affect one
//! record or one file are not returned; they are counted in
//! [`EncodeSummary`], [`DecodeReport`] or [`RestoreResult`].
//!
//! ## Module Organization
//!
//! - [`snapshot`]: the [`Snapshotter`] facade and its builder
//! - [`walker`]: tree enumeration
//! - [`classify`]: text/binary classification
//! - [`record`], [`framing`], [`stream`]: records and their layout in a stream
//! - [`compression`], [`base85`]: the codec race and text-safe encoding
//! - [`artifact`]: artifact headers and legacy layouts
//! - [`restore`], [`sanitize`]: writing entries back to disk safely
//! - [`verification`]: comparing an artifact with its source
//! - [`types`], [`error`]: shared data structures and errors

pub mod artifact;
pub mod base85;
pub mod classify;
pub mod clock;
pub mod compression;
pub mod error;
pub mod framing;
pub mod record;
pub mod restore;
pub mod sanitize;
pub mod snapshot;
pub mod stream;
pub mod types;
pub mod utils;
pub mod verification;
pub mod walker;

// Re-export main types for convenience
pub use artifact::ArtifactLayout;
pub use clock::{Clock, FixedClock, SystemClock};
pub use compression::{CodecTag, CompressionDispatcher, CompressionStats};
pub use error::{Result, SnapshotError};
pub use restore::Restorer;
pub use snapshot::{SnapshotBuilder, Snapshotter};
pub use types::*;
pub use verification::{SnapshotVerifier, VerificationReport};
pub use walker::TreeWalker;
