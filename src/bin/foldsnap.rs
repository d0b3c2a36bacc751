//! # foldsnap CLI - Directory trees as single text artifacts
//!
//! ## Usage
//! ```bash
//! # Pack a directory into ./snapshot_<name>.txt
//! foldsnap create ./my_project
//!
//! # Pack with compression, excluding build output
//! foldsnap create ./my_project --compress --exclude target --exclude "*.log"
//!
//! # Stream an uncompressed artifact to stdout
//! foldsnap create ./my_project --stdout > project.txt
//!
//! # Restore into a directory (existing files are backed up first)
//! foldsnap restore snapshot_my_project.txt --dest ./restored
//!
//! # Compare an artifact with the live tree
//! foldsnap verify snapshot_my_project.txt ./my_project
//!
//! # Show what an artifact contains
//! foldsnap inspect snapshot_my_project.txt --entries
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use foldsnap::utils::format_bytes;
use foldsnap::{
    EntryKind, FramingKind, ProgressCallback, ProgressInfo, SnapshotBuilder, SnapshotConfig,
    Snapshotter,
};
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// foldsnap CLI - pack directory trees into one text file and back
#[derive(Parser)]
#[command(name = "foldsnap")]
#[command(version)]
#[command(about = "Pack a directory tree into a single text artifact and restore it")]
#[command(long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory (or a single file) into an artifact
    Create {
        /// Directory or file to pack
        source: PathBuf,

        /// Directory the artifact is written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Compress the stream
        #[arg(long)]
        compress: bool,

        /// Record framing
        #[arg(long, value_enum)]
        framing: Option<FramingMode>,

        /// Glob patterns to exclude (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Largest file to pack in bytes (0 = unlimited)
        #[arg(long)]
        max_file_size: Option<u64>,

        /// Follow symbolic links
        #[arg(long)]
        follow_symlinks: bool,

        /// Write an uncompressed artifact to stdout instead of a file
        #[arg(long, conflicts_with = "compress")]
        stdout: bool,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Restore an artifact into a directory
    #[command(alias = "rs")]
    Restore {
        /// Artifact file
        artifact: PathBuf,

        /// Destination directory
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,

        /// Overwrite existing files without backing them up
        #[arg(long)]
        no_backup: bool,

        /// Show progress
        #[arg(long)]
        progress: bool,
    },

    /// Compare an artifact with a source tree
    Verify {
        /// Artifact file
        artifact: PathBuf,

        /// Tree the artifact was taken from
        source: PathBuf,
    },

    /// Show the layout and contents of an artifact
    Inspect {
        /// Artifact file
        artifact: PathBuf,

        /// List every entry
        #[arg(short, long)]
        entries: bool,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum FramingMode {
    Verbose,
    Compact,
}

impl From<FramingMode> for FramingKind {
    fn from(mode: FramingMode) -> Self {
        match mode {
            FramingMode::Verbose => FramingKind::Verbose,
            FramingMode::Compact => FramingKind::Compact,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let message = match e.downcast_ref::<foldsnap::SnapshotError>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => SnapshotConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => SnapshotConfig::default(),
    };

    match cli.command {
        Commands::Create {
            source,
            output,
            compress,
            framing,
            exclude,
            max_file_size,
            follow_symlinks,
            stdout,
            progress,
        } => {
            let mut builder = SnapshotBuilder::from_config(config.clone())
                .compress(compress || config.compress)
                .follow_symlinks(follow_symlinks || config.follow_symlinks);
            if let Some(framing) = framing {
                builder = builder.framing(framing.into());
            }
            if !exclude.is_empty() {
                let mut patterns = config.exclude_patterns.clone();
                patterns.extend(exclude);
                builder = builder.exclude_patterns(patterns);
            }
            if let Some(size) = max_file_size {
                builder = builder.max_file_size(size);
            }
            cmd_create(builder, source, output, stdout, progress)
        }
        Commands::Restore {
            artifact,
            dest,
            no_backup,
            progress,
        } => {
            let builder = SnapshotBuilder::from_config(config.clone())
                .backup_existing(config.backup_existing && !no_backup);
            cmd_restore(builder, artifact, dest, progress)
        }
        Commands::Verify { artifact, source } => {
            cmd_verify(Snapshotter::from_config(config)?, artifact, source)
        }
        Commands::Inspect { artifact, entries } => {
            cmd_inspect(Snapshotter::from_config(config)?, artifact, entries)
        }
    }
}

/// Progress bar fed by the library's progress callback
fn progress_bar(enabled: bool, message: &'static str) -> Option<(ProgressBar, ProgressCallback)> {
    if !enabled {
        return None;
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.set_message(message);

    let handle = pb.clone();
    let callback: ProgressCallback = Arc::new(move |info: ProgressInfo| {
        if let Some(total) = info.total {
            handle.set_length(total as u64);
        }
        handle.set_position(info.processed as u64);
        if let Some(item) = info.current_item {
            handle.set_message(format!("{} {}", info.operation, item));
        }
    });
    Some((pb, callback))
}

/// Pack a tree into a file or onto stdout
fn cmd_create(
    mut builder: SnapshotBuilder,
    source: PathBuf,
    output: PathBuf,
    stdout: bool,
    show_progress: bool,
) -> anyhow::Result<()> {
    let start = Instant::now();
    // Progress goes to stderr and would interleave with a streamed artifact
    let progress = progress_bar(show_progress && !stdout, "Packing");
    if let Some((_, callback)) = &progress {
        builder = builder.progress(Arc::clone(callback));
    }
    let snapshotter = builder.build()?;

    if stdout {
        let handle = std::io::stdout().lock();
        let (_, summary) = snapshotter.stream_to(&source, handle)?;
        eprintln!(
            "{} Streamed {} records ({})",
            "✓".green().bold(),
            summary.records_written(),
            format_bytes(summary.artifact_bytes)
        );
        return Ok(());
    }

    eprintln!("{}", "Creating snapshot...".blue().bold());
    let (path, summary) = snapshotter.write_snapshot(&source, &output)?;
    if let Some((pb, _)) = progress {
        pb.finish_and_clear();
    }

    println!("{} Wrote {}", "✓".green().bold(), path.display().to_string().yellow());
    println!(
        "  Records: {} ({} dirs, {} text, {} binary, {} errors)",
        summary.records_written().to_string().cyan(),
        summary.directories,
        summary.text_files,
        summary.binary_files,
        summary.errors
    );
    if summary.skipped > 0 {
        println!("  Skipped: {}", summary.skipped.to_string().yellow());
    }
    println!("  Source: {}", format_bytes(summary.bytes_in).cyan());
    println!("  Artifact: {}", format_bytes(summary.artifact_bytes).cyan());
    if let Some(stats) = &summary.compression {
        println!(
            "  Codec: {} ({:.1}% of stream)",
            stats.winner.to_string().cyan(),
            stats.ratio() * 100.0
        );
        for candidate in &stats.candidates {
            match (candidate.encoded_size, &candidate.error) {
                (Some(size), _) => println!("    {:<5} {}", candidate.tag, format_bytes(size as u64)),
                (None, Some(err)) => println!("    {:<5} {}", candidate.tag, err.red()),
                (None, None) => {}
            }
        }
    }
    for warning in &summary.warnings {
        println!("  {} {}", "!".yellow(), warning);
    }
    println!("  Time: {}", format_duration(start.elapsed()).to_string().cyan());
    Ok(())
}

/// Restore an artifact file
fn cmd_restore(
    mut builder: SnapshotBuilder,
    artifact: PathBuf,
    dest: PathBuf,
    show_progress: bool,
) -> anyhow::Result<()> {
    let progress = progress_bar(show_progress, "Restoring");
    if let Some((_, callback)) = &progress {
        builder = builder.progress(Arc::clone(callback));
    }
    let snapshotter = builder.build()?;

    println!(
        "{} {}",
        "Restoring".blue().bold(),
        artifact.display().to_string().yellow()
    );
    let result = snapshotter.restore_file(&artifact, &dest)?;
    if let Some((pb, _)) = progress {
        pb.finish_and_clear();
    }

    println!("{} Restored into {}", "✓".green().bold(), dest.display().to_string().cyan());
    println!("  Files: {}", result.files_restored.to_string().cyan());
    println!("  Directories: {}", result.directories_created.to_string().cyan());
    println!("  Written: {}", format_bytes(result.bytes_written).cyan());
    if let Some(backup_dir) = &result.backup_dir {
        println!(
            "  Backups: {} in {}",
            result.backups_created.to_string().yellow(),
            backup_dir.display()
        );
    }
    for line in &result.error_entries {
        println!("  {} unreadable at pack time: {}", "!".yellow(), line);
    }
    for failure in &result.failures {
        println!("  {} {}: {}", "✗".red(), failure.path, failure.error);
    }
    print_decode_warnings(&result.decode);
    println!(
        "  Time: {}",
        format_duration(Duration::from_millis(result.duration_ms)).to_string().cyan()
    );

    if !result.failures.is_empty() {
        bail!("{} entries could not be restored", result.failures.len());
    }
    Ok(())
}

/// Compare an artifact with its source
fn cmd_verify(snapshotter: Snapshotter, artifact: PathBuf, source: PathBuf) -> anyhow::Result<()> {
    let bytes = std::fs::read(&artifact)
        .with_context(|| format!("reading {}", artifact.display()))?;
    let report = snapshotter.verify(&bytes, &source)?;

    if report.is_valid() {
        println!("{} {}", "✓".green().bold(), report.summary());
        return Ok(());
    }

    println!("{} {}", "✗".red().bold(), report.summary());
    for path in &report.missing_from_snapshot {
        println!("  {} {}", "missing".yellow(), path);
    }
    for path in &report.extra_in_snapshot {
        println!("  {} {}", "extra".yellow(), path);
    }
    for mismatch in &report.kind_mismatches {
        println!(
            "  {} {} ({} in snapshot, {} in source)",
            "kind".yellow(),
            mismatch.path,
            mismatch.snapshot,
            mismatch.source
        );
    }
    for mismatch in &report.content_mismatches {
        println!(
            "  {} {} ({} vs {})",
            "content".red(),
            mismatch.path,
            &mismatch.snapshot_hash[..12],
            &mismatch.source_hash[..12]
        );
    }
    print_decode_warnings(&report.decode);
    bail!("snapshot does not match {}", source.display())
}

/// Describe an artifact without restoring it
fn cmd_inspect(snapshotter: Snapshotter, artifact: PathBuf, list: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(&artifact)
        .with_context(|| format!("reading {}", artifact.display()))?;
    let outcome = snapshotter.decode_artifact(&bytes)?;

    println!("{}", artifact.display().to_string().bold());
    println!("  Size: {}", format_bytes(bytes.len() as u64).cyan());
    println!("  Layout: {}", format!("{:?}", outcome.layout).cyan());
    if let Some(codec) = outcome.codec {
        println!("  Codec: {}", codec.to_string().cyan());
    }
    if let Some(framing) = outcome.framing {
        println!("  Framing: {}", format!("{:?}", framing).to_lowercase().cyan());
    }

    let files = outcome.entries.iter().filter(|e| e.is_file()).count();
    let dirs = outcome.entries.iter().filter(|e| e.is_directory()).count();
    let total: u64 = outcome.entries.iter().map(|e| e.size()).sum();
    println!(
        "  Entries: {} ({} files, {} dirs, {} errors)",
        outcome.entries.len().to_string().cyan(),
        files,
        dirs,
        outcome.report.error_records
    );
    println!("  Content: {}", format_bytes(total).cyan());

    if list {
        println!();
        for entry in &outcome.entries {
            let label = entry.kind.label();
            match &entry.kind {
                EntryKind::Directory => println!("  {:<5} {}/", label.blue(), entry.relative_path),
                EntryKind::File { encoding, .. } => println!(
                    "  {:<5} {} ({}, {:?})",
                    label,
                    entry.relative_path,
                    format_bytes(entry.size()),
                    encoding
                ),
                EntryKind::EnumerationError { message } => println!(
                    "  {:<5} {}: {}",
                    label.red(),
                    entry.relative_path,
                    message
                ),
            }
        }
    }

    print_decode_warnings(&outcome.report);
    Ok(())
}

fn print_decode_warnings(report: &foldsnap::DecodeReport) {
    if report.is_clean() {
        return;
    }
    println!(
        "  {} decoded with losses: {} damaged records{}",
        "!".yellow(),
        report.failed(),
        if report.truncated { ", truncated" } else { "" }
    );
    for warning in &report.warnings {
        println!("    {}", warning.dimmed());
    }
}
