//! Integration tests for foldsnap
//!
//! Tests real-world scenarios: generated project trees in every framing and
//! compression mode, repeated restores with backups, and content that looks
//! like framing syntax.

use ::foldsnap::*;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::info;

/// Test harness holding a source tree and a restore destination
pub struct SnapshotTestHarness {
    pub source: TempDir,
    pub destination: TempDir,
    pub file_generator: FileGenerator,
}

impl SnapshotTestHarness {
    /// Create a new test harness
    pub fn new() -> Self {
        Self {
            source: TempDir::new().unwrap(),
            destination: TempDir::new().unwrap(),
            file_generator: FileGenerator::new(42),
        }
    }

    /// Generate a project-like tree
    pub fn generate_project(&mut self, config: ProjectConfig) -> anyhow::Result<()> {
        let root = self.source.path();
        for d in 0..config.directories {
            let dir = root.join(format!("module_{}", d));
            fs::create_dir_all(&dir)?;
            for f in 0..config.files_per_directory {
                let path = dir.join(format!("file_{}.rs", f));
                fs::write(path, self.file_generator.source_text(config.max_lines))?;
            }
            if d % 2 == 0 {
                fs::write(dir.join("asset.bin"), self.file_generator.binary(config.binary_size))?;
            }
        }
        for e in 0..config.empty_directories {
            fs::create_dir_all(root.join(format!("empty_{}/leaf", e)))?;
        }
        info!("Generated project in {:?}", root);
        Ok(())
    }

    /// Snapshot the source, restore it into the destination, and compare
    pub fn roundtrip(&self, snapshotter: &Snapshotter) -> anyhow::Result<RestoreResult> {
        let (artifact, summary) = snapshotter.encode_tree(self.source.path())?;
        info!(
            "Encoded {} records into {} bytes",
            summary.records_written(),
            artifact.len()
        );
        let result = snapshotter.restore_artifact(&artifact, self.destination.path())?;
        assert_trees_equal(self.source.path(), self.destination.path());
        Ok(result)
    }
}

/// Project shape for [`SnapshotTestHarness::generate_project`]
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub directories: usize,
    pub files_per_directory: usize,
    pub empty_directories: usize,
    pub max_lines: usize,
    pub binary_size: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            directories: 4,
            files_per_directory: 5,
            empty_directories: 2,
            max_lines: 40,
            binary_size: 512,
        }
    }
}

/// Seeded content generator
pub struct FileGenerator {
    rng: StdRng,
}

impl FileGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source-like text, sometimes with lines that resemble markers
    pub fn source_text(&mut self, max_lines: usize) -> String {
        const LINES: &[&str] = &[
            "fn main() {",
            "    let x = 42;",
            "}",
            "@media screen {",
            "@Override",
            "@app.route('/')",
            "--- entry ---",
            "!important",
            "[EMPTY_DIRECTORY]",
            "// comment",
            "",
        ];
        let count = self.rng.random_range(0..=max_lines);
        let mut text = String::new();
        for _ in 0..count {
            text.push_str(LINES[self.rng.random_range(0..LINES.len())]);
            text.push('\n');
        }
        text
    }

    /// Random bytes
    pub fn binary(&mut self, len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        self.rng.fill(&mut data[..]);
        data
    }
}

/// Relative path -> content (None for directories) for every node under `root`,
/// leaving out backups
pub fn tree_contents(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    let mut contents = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.unwrap();
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap()
            .to_string_lossy()
            .replace('\\', "/");
        if relative.starts_with(".foldsnap_backup") {
            continue;
        }
        let content = entry
            .file_type()
            .is_file()
            .then(|| fs::read(entry.path()).unwrap());
        contents.insert(relative, content);
    }
    contents
}

/// Assert two trees hold the same paths and bytes
pub fn assert_trees_equal(expected: &Path, actual: &Path) {
    let expected = tree_contents(expected);
    let actual = tree_contents(actual);
    assert_eq!(
        expected.keys().collect::<Vec<_>>(),
        actual.keys().collect::<Vec<_>>()
    );
    for (path, content) in &expected {
        assert_eq!(content, &actual[path], "content differs for {}", path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_scenario_tree_both_framings() {
        let source = TempDir::new().unwrap();
        let bytes = FileGenerator::new(7).binary(3);
        fs::write(source.path().join("a.txt"), "hello\n").unwrap();
        fs::create_dir(source.path().join("empty")).unwrap();
        fs::write(source.path().join("img.bin"), &bytes).unwrap();

        for compress in [false, true] {
            for framing in [FramingKind::Verbose, FramingKind::Compact] {
                let destination = TempDir::new().unwrap();
                let snapshotter = Snapshotter::builder()
                    .compress(compress)
                    .framing(framing)
                    .build()
                    .unwrap();

                let (artifact, summary) = snapshotter.encode_tree(source.path()).unwrap();
                assert_eq!(summary.text_files, 1);
                assert_eq!(summary.directories, 1);
                assert_eq!(summary.binary_files, 1);

                let outcome = snapshotter.decode_artifact(&artifact).unwrap();
                assert_eq!(outcome.framing, Some(framing));
                assert_eq!(
                    outcome.entries,
                    vec![
                        TreeEntry::file("a.txt", b"hello\n".to_vec(), EncodingHint::Text),
                        TreeEntry::directory("empty"),
                        TreeEntry::file("img.bin", bytes.clone(), EncodingHint::Binary),
                    ]
                );

                let result = snapshotter
                    .restore_artifact(&artifact, destination.path())
                    .unwrap();
                assert_eq!(result.files_restored, 2);
                assert_trees_equal(source.path(), destination.path());
            }
        }
    }

    #[test]
    #[traced_test]
    fn test_generated_project_roundtrip() {
        let mut harness = SnapshotTestHarness::new();
        harness.generate_project(ProjectConfig::default()).unwrap();

        for framing in [FramingKind::Verbose, FramingKind::Compact] {
            let snapshotter = Snapshotter::builder()
                .framing(framing)
                .compress(true)
                .build()
                .unwrap();
            let result = harness.roundtrip(&snapshotter).unwrap();
            assert!(result.failures.is_empty());
            assert!(result.decode.is_clean());
        }
        assert!(logs_contain("Generated project"));
    }

    #[test]
    fn test_idempotent_restore_creates_backups() {
        let mut harness = SnapshotTestHarness::new();
        harness
            .generate_project(ProjectConfig {
                directories: 2,
                files_per_directory: 2,
                empty_directories: 0,
                ..Default::default()
            })
            .unwrap();

        let at = NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_milli_opt(5, 6, 7, 8)
            .unwrap();
        let snapshotter = Snapshotter::builder()
            .clock(Arc::new(FixedClock(at)))
            .build()
            .unwrap();

        let first = harness.roundtrip(&snapshotter).unwrap();
        assert_eq!(first.backups_created, 0);

        let second = harness.roundtrip(&snapshotter).unwrap();
        assert_eq!(second.backups_created, second.files_restored);
        let backup_root = harness
            .destination
            .path()
            .join(".foldsnap_backup")
            .join("20250304_050607_008");
        assert_eq!(second.backup_dir.as_deref(), Some(backup_root.as_path()));
        assert_trees_equal(harness.source.path(), &backup_root);
    }

    #[test]
    fn test_css_and_decorators_survive_compact() {
        let source = TempDir::new().unwrap();
        let destination = TempDir::new().unwrap();
        let css = "@import url(\"base.css\");\n@media (max-width: 600px) {\n  .a { color: red }\n}\n@font-face {\n  font-family: x;\n}\n";
        let py = "@dataclass\nclass Point:\n    x: int\n\n@property\ndef norm(self):\n    return 0\n";
        let java = "class A {\n  @Override\n  public String toString() { return \"\"; }\n}\n@Deprecated\nclass B {}\n";
        fs::write(source.path().join("style.css"), css).unwrap();
        fs::write(source.path().join("point.py"), py).unwrap();
        fs::write(source.path().join("A.java"), java).unwrap();

        let snapshotter = Snapshotter::builder()
            .framing(FramingKind::Compact)
            .build()
            .unwrap();
        let (artifact, _) = snapshotter.encode_tree(source.path()).unwrap();
        let outcome = snapshotter.decode_artifact(&artifact).unwrap();
        assert_eq!(outcome.entries.len(), 3);
        assert!(outcome.report.is_clean());

        snapshotter.restore_artifact(&artifact, destination.path()).unwrap();
        assert_trees_equal(source.path(), destination.path());
    }

    #[test]
    fn test_excludes_and_size_limit() {
        let source = TempDir::new().unwrap();
        fs::create_dir_all(source.path().join("target/debug")).unwrap();
        fs::write(source.path().join("target/debug/app"), "binary").unwrap();
        fs::write(source.path().join("keep.rs"), "fn keep() {}\n").unwrap();
        fs::write(source.path().join("debug.log"), "noise").unwrap();
        fs::write(source.path().join("huge.txt"), "x".repeat(2048)).unwrap();

        let snapshotter = Snapshotter::builder()
            .exclude_patterns(vec!["target/".to_string(), "*.log".to_string()])
            .max_file_size(1024)
            .build()
            .unwrap();
        let (artifact, summary) = snapshotter.encode_tree(source.path()).unwrap();
        assert_eq!(summary.errors, 1);

        let outcome = snapshotter.decode_artifact(&artifact).unwrap();
        let paths: Vec<_> = outcome.entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["huge.txt", "keep.rs"]);
        assert!(matches!(
            &outcome.entries[0].kind,
            EntryKind::EnumerationError { message } if message.contains("too large")
        ));

        let destination = TempDir::new().unwrap();
        let result = snapshotter
            .restore_artifact(&artifact, destination.path())
            .unwrap();
        assert_eq!(result.error_entries.len(), 1);
        assert!(!destination.path().join("huge.txt").exists());
    }

    #[test]
    fn test_legacy_sectioned_artifact() {
        let destination = TempDir::new().unwrap();
        let separator = "=".repeat(50);
        let legacy = format!(
            "=== SNAPSHOT_FORMAT: UNCOMPRESSED ===\n\n=== 文件: src/app.py ===\nprint('hi')\n\n{sep}\n\n=== 文件: README.md ===\n# Title\n\n{sep}\n\n",
            sep = separator
        );

        let snapshotter = Snapshotter::builder().build().unwrap();
        let outcome = snapshotter.decode_artifact(legacy.as_bytes()).unwrap();
        assert_eq!(outcome.layout, ArtifactLayout::LegacySections { compressed: false });

        let result = snapshotter
            .restore_artifact(legacy.as_bytes(), destination.path())
            .unwrap();
        assert_eq!(result.files_restored, 2);
        assert_eq!(
            fs::read_to_string(destination.path().join("src/app.py")).unwrap(),
            "print('hi')\n"
        );
    }

    #[test]
    fn test_streamed_artifact_restores() {
        let mut harness = SnapshotTestHarness::new();
        harness.generate_project(ProjectConfig::default()).unwrap();
        let snapshotter = Snapshotter::builder().build().unwrap();

        let output = TempDir::new().unwrap();
        let path = output.path().join("streamed.txt");
        let file = fs::File::create(&path).unwrap();
        let (writer, summary) = snapshotter
            .stream_to(harness.source.path(), std::io::BufWriter::new(file))
            .unwrap();
        writer.into_inner().unwrap();
        assert_eq!(summary.artifact_bytes, fs::metadata(&path).unwrap().len());

        snapshotter
            .restore_file(&path, harness.destination.path())
            .unwrap();
        assert_trees_equal(harness.source.path(), harness.destination.path());
    }
}
