//! Tree walking for snapshots
//!
//! [`TreeWalker`] enumerates a root path into [`TreeEntry`] values in the
//! order they are framed: depth-first pre-order, siblings sorted by file name,
//! every directory emitted before its contents (so empty directories are kept).
//!
//! The walk is split in two so a streaming writer can hold one file in memory
//! at a time:
//!
//! - [`TreeWalker::list`] stats the tree and returns cheap [`WalkItem`]s
//! - [`TreeWalker::load`] reads and classifies one item
//!
//! Nodes that cannot be read do not abort the walk. They come back as
//! [`EnumerationError`](crate::types::EntryKind::EnumerationError) entries carrying the error text, and so do
//! symbolic links (unless followed), special files and files over the size
//! limit.
//!
//! ## Example
//!
//! ```rust,no_run
//! use foldsnap::walker::TreeWalker;
//! use std::path::PathBuf;
//!
//! # fn main() -> foldsnap::Result<()> {
//! let walker = TreeWalker::new(PathBuf::from("./my_project"))
//!     .with_exclude_patterns(vec!["target".to_string(), "*.tmp".to_string()])?
//!     .with_max_file_size(10 * 1024 * 1024);
//!
//! for item in walker.list()? {
//!     let entry = walker.load(&item);
//!     println!("{} ({} bytes)", entry.relative_path, entry.size());
//! }
//! # Ok(())
//! # }
//! ```

use crate::classify::ContentClassifier;
use crate::error::{Result, SnapshotError};
use crate::types::{ProgressInfo, TreeEntry};
use crate::utils;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

/// What a listed node turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkKind {
    /// A directory
    Directory,
    /// A regular file of the given size
    File {
        /// Size from metadata at listing time
        size: u64,
    },
    /// The node cannot be packed
    Error {
        /// Why
        message: String,
    },
}

/// One node found by [`TreeWalker::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkItem {
    /// Forward-slash path relative to the walk root
    pub relative_path: String,
    /// Location on disk
    pub absolute_path: PathBuf,
    /// Node kind
    pub kind: WalkKind,
}

/// Enumerates a file or directory tree
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root_path: PathBuf,
    exclude_patterns: Vec<String>,
    excludes: GlobSet,
    max_file_size: u64,
    follow_symlinks: bool,
    classifier: ContentClassifier,
}

impl TreeWalker {
    /// Create a walker with no excludes, no size limit and symlinks not followed
    pub fn new(root_path: PathBuf) -> Self {
        Self {
            root_path,
            exclude_patterns: Vec::new(),
            excludes: GlobSet::empty(),
            max_file_size: 0,
            follow_symlinks: false,
            classifier: ContentClassifier::default(),
        }
    }

    /// Exclude paths matching any of these glob patterns
    ///
    /// A pattern is matched against the relative path and the file name, so
    /// `target` excludes a top-level `target` directory and `*.log` excludes
    /// log files at any depth. An excluded directory prunes its whole subtree.
    /// A trailing `/` is accepted and ignored.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::InvalidPattern`] if a pattern does not compile.
    pub fn with_exclude_patterns(mut self, patterns: Vec<String>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            let trimmed = pattern.trim_end_matches('/');
            let glob = Glob::new(trimmed)
                .map_err(|e| SnapshotError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        self.excludes = builder
            .build()
            .map_err(|e| SnapshotError::InvalidPattern(e.to_string()))?;
        self.exclude_patterns = patterns;
        Ok(self)
    }

    /// Maximum file size in bytes (0 = unlimited)
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    /// Follow symbolic links instead of reporting them
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Classifier used by [`TreeWalker::load`]
    pub fn with_classifier(mut self, classifier: ContentClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Walk root
    pub fn root(&self) -> &Path {
        &self.root_path
    }

    /// Exclude patterns as given
    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    fn is_excluded(&self, relative: &str) -> bool {
        if self.excludes.is_empty() || relative.is_empty() {
            return false;
        }
        if self.excludes.is_match(relative) {
            return true;
        }
        relative
            .rsplit('/')
            .next()
            .is_some_and(|name| self.excludes.is_match(name))
    }

    /// List every node under the root in walk order
    ///
    /// A root that is a single file yields one item named after the file.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::SourceNotFound`] if the root does not exist. Problems
    /// below the root become [`WalkKind::Error`] items.
    pub fn list(&self) -> Result<Vec<WalkItem>> {
        let root_meta = if self.follow_symlinks {
            fs::metadata(&self.root_path)
        } else {
            fs::symlink_metadata(&self.root_path)
        }
        .map_err(|_| SnapshotError::SourceNotFound(self.root_path.clone()))?;

        if !root_meta.is_dir() {
            let name = self
                .root_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| SnapshotError::SourceNotFound(self.root_path.clone()))?;
            let kind = if root_meta.is_file() {
                WalkKind::File {
                    size: root_meta.len(),
                }
            } else {
                unsupported(&self.root_path)
            };
            return Ok(vec![WalkItem {
                relative_path: name,
                absolute_path: self.root_path.clone(),
                kind,
            }]);
        }

        debug!("Listing {:?}", self.root_path);
        let mut items = Vec::new();
        let walker = WalkDir::new(&self.root_path)
            .min_depth(1)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = self.relative_of(entry.path());
                let excluded = self.is_excluded(&relative);
                if excluded {
                    trace!("Excluded {}", relative);
                }
                !excluded
            });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    let relative_path = self.relative_of(entry.path());
                    let file_type = entry.file_type();
                    let kind = if file_type.is_dir() {
                        WalkKind::Directory
                    } else if file_type.is_file() {
                        match entry.metadata() {
                            Ok(meta) => WalkKind::File { size: meta.len() },
                            Err(e) => WalkKind::Error {
                                message: e.to_string(),
                            },
                        }
                    } else {
                        unsupported(entry.path())
                    };
                    items.push(WalkItem {
                        relative_path,
                        absolute_path: entry.into_path(),
                        kind,
                    });
                }
                Err(e) => {
                    let Some(path) = e.path().map(Path::to_path_buf) else {
                        warn!("Walk error without a path: {}", e);
                        continue;
                    };
                    let relative_path = self.relative_of(&path);
                    if relative_path.is_empty() {
                        return Err(SnapshotError::WalkDir(e));
                    }
                    warn!("Cannot read {}: {}", relative_path, e);
                    items.push(WalkItem {
                        relative_path,
                        absolute_path: path,
                        kind: WalkKind::Error {
                            message: io_message(&e),
                        },
                    });
                }
            }
        }

        debug!("Listed {} nodes", items.len());
        Ok(items)
    }

    /// Turn a listed item into an entry, reading the file if it is one
    ///
    /// Never fails: read errors and oversized files become error entries.
    pub fn load(&self, item: &WalkItem) -> TreeEntry {
        match &item.kind {
            WalkKind::Directory => TreeEntry::directory(item.relative_path.clone()),
            WalkKind::Error { message } => {
                TreeEntry::error(item.relative_path.clone(), message.clone())
            }
            WalkKind::File { size } => {
                if self.max_file_size > 0 && *size > self.max_file_size {
                    let err = SnapshotError::FileTooLarge {
                        path: item.absolute_path.clone(),
                        size: *size,
                        limit: self.max_file_size,
                    };
                    warn!("{}", err);
                    return TreeEntry::error(item.relative_path.clone(), err.to_string());
                }
                match fs::read(&item.absolute_path) {
                    Ok(content) => {
                        let encoding = self.classifier.classify(&item.absolute_path, &content);
                        trace!("Read {} ({:?}, {} bytes)", item.relative_path, encoding, content.len());
                        TreeEntry::file(item.relative_path.clone(), content, encoding)
                    }
                    Err(e) => {
                        warn!("Cannot read {}: {}", item.relative_path, e);
                        TreeEntry::error(item.relative_path.clone(), e.to_string())
                    }
                }
            }
        }
    }

    /// List and load the whole tree
    pub fn walk(&self) -> Result<Vec<TreeEntry>> {
        self.walk_with_progress(None::<fn(ProgressInfo)>)
    }

    /// List and load the whole tree, reporting each loaded entry
    pub fn walk_with_progress<F>(&self, progress: Option<F>) -> Result<Vec<TreeEntry>>
    where
        F: Fn(ProgressInfo),
    {
        let items = self.list()?;
        let total = items.len();
        let total_bytes = items
            .iter()
            .map(|item| match item.kind {
                WalkKind::File { size } => size,
                _ => 0,
            })
            .sum();

        let mut bytes_processed = 0u64;
        let mut entries = Vec::with_capacity(total);
        for (i, item) in items.iter().enumerate() {
            let entry = self.load(item);
            bytes_processed += entry.size();
            if let Some(callback) = &progress {
                callback(ProgressInfo {
                    operation: "Packing".to_string(),
                    current_item: Some(item.relative_path.clone()),
                    processed: i + 1,
                    total: Some(total),
                    bytes_processed,
                    total_bytes: Some(total_bytes),
                });
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    fn relative_of(&self, path: &Path) -> String {
        utils::make_relative(path, &self.root_path)
            .map(|relative| utils::to_slash_path(&relative))
            .unwrap_or_else(|_| utils::to_slash_path(path))
    }
}

fn unsupported(path: &Path) -> WalkKind {
    WalkKind::Error {
        message: SnapshotError::UnsupportedFileType {
            path: path.to_path_buf(),
        }
        .to_string(),
    }
}

fn io_message(e: &walkdir::Error) -> String {
    match e.io_error() {
        Some(io) => io.to_string(),
        None => e.to_string(),
    }
}
