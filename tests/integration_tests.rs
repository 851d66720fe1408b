//! Integration tests for sortmind
//!
//! These tests run complete workflows against real temporary directories:
//! 1. Organization through the pipeline
//! 2. Conflicts and repeated runs
//! 3. Undo
//! 4. Filters and category mappings
//! 5. Backup, restore and cleanup through the command line

use clap::Parser;
use sortmind::Classifier;
use sortmind::cli::{self, Cli, CliError};
use sortmind::config::AppConfig;
use sortmind::organizer::{HISTORY_FILE_NAME, MoveHistory, Reorganizer};
use sortmind::pipeline::{Pipeline, Stage};
use sortmind::rules::{CategoryRule, RuleSet};
use sortmind::undo::UndoManager;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// A temporary directory with helpers to lay out and inspect files.
struct TestFixture {
    temp_dir: TempDir,
}

impl TestFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        TestFixture { temp_dir }
    }

    fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file, including missing parent directories.
    fn create_file(&self, rel_path: &str, content: &[u8]) {
        let file_path = self.path().join(rel_path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content)
            .expect("Failed to write file content");
    }

    fn create_text_file(&self, rel_path: &str, content: &str) {
        self.create_file(rel_path, content.as_bytes());
    }

    fn create_files(&self, files: &[(&str, &[u8])]) {
        for (name, content) in files {
            self.create_file(name, content);
        }
    }

    fn read(&self, rel_path: &str) -> String {
        fs::read_to_string(self.path().join(rel_path)).expect("Failed to read file")
    }

    fn assert_dir_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(path.is_dir(), "Directory should exist: {}", path.display());
    }

    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(path.is_file(), "File should exist: {}", path.display());
    }

    fn assert_not_exists(&self, rel_path: &str) {
        let path = self.path().join(rel_path);
        assert!(!path.exists(), "Path should not exist: {}", path.display());
    }

    /// All files below the fixture, relative to it, sorted. The history file is left out.
    fn list_files_recursive(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        Self::walk_dir(self.path(), &mut files);
        let mut relative: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| p.file_name().is_some_and(|n| n != HISTORY_FILE_NAME))
            .map(|p| p.strip_prefix(self.path()).unwrap().to_path_buf())
            .collect();
        relative.sort();
        relative
    }

    fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    files.push(path);
                } else if path.is_dir() {
                    Self::walk_dir(&path, files);
                }
            }
        }
    }

    /// Mapping store path inside the fixture, so tests never read the user's store.
    fn mappings(&self) -> PathBuf {
        self.path().join("mappings.json")
    }

    /// Parse and run a command line with the fixture's mapping store.
    fn run_cli(&self, args: &[&str]) -> Result<(), CliError> {
        let mappings = self.mappings();
        let mut argv = vec!["sortmind", "--mappings", mappings.to_str().unwrap()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).expect("arguments should parse");
        cli::run(&cli, &AppConfig::default())
    }
}

fn default_pipeline() -> Pipeline {
    let filters = AppConfig::default()
        .compile_filters()
        .expect("default filters compile");
    Pipeline::new(Classifier::new(RuleSet::default()), Some(filters))
}

fn rel(p: &str) -> PathBuf {
    PathBuf::from(p)
}

// ============================================================================
// Test Data
// ============================================================================

const PNG_HEADER: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, // PNG signature
    0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52, // IHDR chunk
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, // 1x1 image
    0x08, 0x02, 0x00, 0x00, 0x00, 0x90, 0x77, 0x53, // bit depth, color
    0xDE,
];

const PDF_HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

const ZIP_HEADER: &[u8] = &[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x00, 0x00];

// ============================================================================
// Test Suite 1: Organization
// ============================================================================

#[test]
fn test_organize_empty_directory() {
    let fixture = TestFixture::new();

    let report = default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed");

    assert_eq!(report.scanned, 0);
    assert!(report.report.success.is_empty());
    // Nothing moved, so no history and no leftover category folders.
    fixture.assert_not_exists(HISTORY_FILE_NAME);
    assert_eq!(fs::read_dir(fixture.path()).unwrap().count(), 0);
}

#[test]
fn test_organize_mixed_file_types() {
    let fixture = TestFixture::new();
    fixture.create_files(&[
        ("photo.png", PNG_HEADER),
        ("report.pdf", PDF_HEADER),
        ("bundle.zip", ZIP_HEADER),
        ("main.py", "print('hi')\n".as_bytes()),
        ("logo.svg", "<svg/>".as_bytes()),
        ("unknown.xyz", "???".as_bytes()),
    ]);

    let report = default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed");

    assert_eq!(report.scanned, 6);
    assert_eq!(report.report.success.len(), 6);
    assert!(report.report.error.is_empty());
    assert_eq!(
        fixture.list_files_recursive(),
        vec![
            rel("archive/bundle.zip"),
            rel("code/main.py"),
            rel("design/logo.svg"),
            rel("document/report.pdf"),
            rel("media/photo.png"),
            rel("other/unknown.xyz"),
        ]
    );
    fixture.assert_file_exists(HISTORY_FILE_NAME);
}

#[test]
fn test_organize_uses_content_and_keywords_without_extension() {
    let fixture = TestFixture::new();
    fixture.create_file("IMG_0042", PNG_HEADER);
    fixture.create_text_file("invoice_march", "amount due");

    default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed");

    fixture.assert_file_exists("media/IMG_0042");
    fixture.assert_file_exists("document/invoice_march");
}

#[test]
fn test_organize_flattens_nested_files_and_cleans_up() {
    let fixture = TestFixture::new();
    fixture.create_file("inbox/2024/scan.pdf", PDF_HEADER);
    fixture.create_file("inbox/pics/cat.png", PNG_HEADER);
    fs::create_dir_all(fixture.path().join("empty/deeper")).unwrap();

    let report = default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed");

    fixture.assert_file_exists("document/scan.pdf");
    fixture.assert_file_exists("media/cat.png");
    fixture.assert_not_exists("inbox");
    fixture.assert_not_exists("empty");
    fixture.assert_not_exists("code");
    assert!(report.removed_dirs.len() >= 5);
}

#[test]
fn test_hidden_files_are_left_alone() {
    let fixture = TestFixture::new();
    fixture.create_text_file(".env", "SECRET=1");
    fixture.create_file("report.pdf", PDF_HEADER);

    default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed");

    fixture.assert_file_exists(".env");
    fixture.assert_file_exists("document/report.pdf");
}

#[test]
fn test_progress_milestones_through_spawned_run() {
    let fixture = TestFixture::new();
    fixture.create_file("report.pdf", PDF_HEADER);

    let mut percents = Vec::new();
    let report = default_pipeline()
        .spawn(fixture.path().to_path_buf())
        .expect("spawn failed")
        .wait(|stage: Stage| percents.push(stage.percent()))
        .expect("run failed");

    assert_eq!(percents, vec![20, 40, 60, 80, 100]);
    assert_eq!(report.history.len(), 1);
}

// ============================================================================
// Test Suite 2: Conflicts and repeated runs
// ============================================================================

#[test]
fn test_conflicting_name_is_suffixed_not_overwritten() {
    let fixture = TestFixture::new();
    fixture.create_text_file("document/notes.txt", "already sorted");
    fixture.create_text_file("notes.txt", "new arrival");

    let report = default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed");

    assert!(report.report.is_complete_success());
    assert_eq!(fixture.read("document/notes.txt"), "already sorted");

    let files = fixture.list_files_recursive();
    assert_eq!(files.len(), 2);
    let renamed = files
        .iter()
        .find(|p| *p != &rel("document/notes.txt"))
        .expect("renamed file missing");
    let name = renamed.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("notes_") && name.ends_with(".txt"), "{}", name);
    assert_eq!(
        fs::read_to_string(fixture.path().join(renamed)).unwrap(),
        "new arrival"
    );
}

#[test]
fn test_second_run_is_a_noop() {
    let fixture = TestFixture::new();
    fixture.create_files(&[("photo.png", PNG_HEADER), ("report.pdf", PDF_HEADER)]);

    let pipeline = default_pipeline();
    pipeline.run(fixture.path(), |_| {}).expect("run failed");
    let layout = fixture.list_files_recursive();

    let second = pipeline.run(fixture.path(), |_| {}).expect("run failed");

    assert!(second.history.is_empty());
    assert_eq!(second.report.success.len(), 2);
    assert_eq!(fixture.list_files_recursive(), layout);
}

// ============================================================================
// Test Suite 3: Undo
// ============================================================================

#[test]
fn test_undo_restores_original_layout() {
    let fixture = TestFixture::new();
    fixture.create_file("photo.png", PNG_HEADER);
    fixture.create_file("inbox/report.pdf", PDF_HEADER);
    fixture.create_text_file("notes/todo.txt", "milk");
    let before = fixture.list_files_recursive();

    default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed");
    assert_ne!(fixture.list_files_recursive(), before);

    let report = UndoManager::undo_from_history_file(fixture.path()).expect("undo failed");

    assert!(report.is_complete_success());
    assert_eq!(report.success.len(), 3);
    assert_eq!(fixture.list_files_recursive(), before);
    fixture.assert_not_exists(HISTORY_FILE_NAME);
}

#[test]
fn test_undo_after_conflict_keeps_both_files() {
    let fixture = TestFixture::new();
    fixture.create_text_file("notes.txt", "first");

    let history = default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed")
        .history;
    // Someone drops a new file where the original used to be.
    fixture.create_text_file("notes.txt", "second");

    let report = UndoManager::undo(&history);

    assert!(report.is_complete_success());
    assert_eq!(fixture.read("notes.txt"), "first");
    let aside: Vec<_> = fs::read_dir(fixture.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("notes.txt.bak."))
        .collect();
    assert_eq!(aside.len(), 1);
    assert_eq!(fs::read_to_string(aside[0].path()).unwrap(), "second");
}

#[test]
fn test_undo_without_history_is_an_error() {
    let fixture = TestFixture::new();
    fixture.create_file("report.pdf", PDF_HEADER);

    assert!(UndoManager::undo_from_history_file(fixture.path()).is_err());
    fixture.assert_file_exists("report.pdf");
}

#[test]
fn test_undo_reports_files_removed_after_organize() {
    let fixture = TestFixture::new();
    fixture.create_file("photo.png", PNG_HEADER);
    fixture.create_file("report.pdf", PDF_HEADER);

    default_pipeline()
        .run(fixture.path(), |_| {})
        .expect("run failed");
    fs::remove_file(fixture.path().join("media/photo.png")).unwrap();

    let result = fixture.run_cli(&["undo", fixture.path().to_str().unwrap()]);

    assert!(matches!(result, Err(CliError::Incomplete { failed: 1 })));
    fixture.assert_file_exists("report.pdf");
    // The history stays so the undo can be retried.
    fixture.assert_file_exists(HISTORY_FILE_NAME);
}

// ============================================================================
// Test Suite 4: Filters and category mappings
// ============================================================================

#[test]
fn test_configured_exclusions_are_not_moved() {
    let fixture = TestFixture::new();
    let project = fixture.path().join("project");
    fs::create_dir(&project).unwrap();
    fs::write(project.join("Thumbs.db"), "cache").unwrap();
    fs::write(project.join("build.tmp"), "tmp").unwrap();
    fs::write(project.join("report.pdf"), PDF_HEADER).unwrap();

    let config_path = fixture.path().join("sortmind.toml");
    fs::write(
        &config_path,
        "[filters.exclude]\nfilenames = [\"Thumbs.db\"]\nextensions = [\"tmp\"]\n",
    )
    .unwrap();
    let config = AppConfig::load(Some(&config_path)).expect("config should load");
    let filters = config.compile_filters().expect("filters compile");

    Pipeline::new(Classifier::new(RuleSet::default()), Some(filters))
        .run(&project, |_| {})
        .expect("run failed");

    assert!(project.join("Thumbs.db").exists());
    assert!(project.join("build.tmp").exists());
    assert!(project.join("document/report.pdf").exists());
}

#[test]
fn test_custom_mapping_store_adds_category() {
    let fixture = TestFixture::new();
    fs::write(
        fixture.mappings(),
        r#"{"ebooks": {"name": "E-books", "extensions": ["EPUB"]}}"#,
    )
    .unwrap();
    let library = fixture.path().join("library");
    fs::create_dir(&library).unwrap();
    fs::write(library.join("novel.epub"), "book").unwrap();
    fs::write(library.join("report.pdf"), PDF_HEADER).unwrap();

    fixture
        .run_cli(&["organize", library.to_str().unwrap()])
        .expect("organize failed");

    assert!(library.join("ebooks/novel.epub").exists());
    // The store replaces the built-in rules entirely.
    assert!(library.join("other/report.pdf").exists());
}

#[test]
fn test_broken_mapping_store_falls_back_to_defaults() {
    let fixture = TestFixture::new();
    fs::write(fixture.mappings(), "{ not json").unwrap();
    let inbox = fixture.path().join("inbox");
    fs::create_dir(&inbox).unwrap();
    fs::write(inbox.join("report.pdf"), PDF_HEADER).unwrap();

    fixture
        .run_cli(&["organize", inbox.to_str().unwrap()])
        .expect("organize failed");

    assert!(inbox.join("document/report.pdf").exists());
}

#[test]
fn test_rules_set_then_organize() {
    let fixture = TestFixture::new();
    let inbox = fixture.path().join("inbox");
    fs::create_dir(&inbox).unwrap();
    fs::write(inbox.join("q3_budget.numbers"), "sheet").unwrap();

    fixture
        .run_cli(&["rules", "set", "finance", "--name", "Finance", "--keyword", "budget"])
        .expect("rules set failed");
    fixture
        .run_cli(&["organize", inbox.to_str().unwrap()])
        .expect("organize failed");

    assert!(inbox.join("finance/q3_budget.numbers").exists());
    let rules = RuleSet::load(&fixture.mappings()).expect("store written");
    assert!(rules.contains("document"));
    assert!(rules.contains("finance"));
}

#[test]
fn test_classifier_update_rules_changes_classification() {
    let mut classifier = Classifier::new(RuleSet::default());
    assert_eq!(classifier.classify_parts("book.epub", ".epub", "application/epub+zip"), "other");

    classifier
        .update_rules(BTreeMap::from([(
            "ebooks".to_string(),
            CategoryRule::named("E-books").with_extensions(&["epub"]),
        )]))
        .expect("in-memory update cannot fail");

    assert_eq!(classifier.classify_parts("book.epub", ".epub", "application/epub+zip"), "ebooks");
}

// ============================================================================
// Test Suite 5: Command line
// ============================================================================

#[test]
fn test_cli_dry_run_changes_nothing() {
    let fixture = TestFixture::new();
    let inbox = fixture.path().join("inbox");
    fs::create_dir(&inbox).unwrap();
    fs::write(inbox.join("photo.png"), PNG_HEADER).unwrap();

    fixture
        .run_cli(&["organize", inbox.to_str().unwrap(), "--dry-run"])
        .expect("dry run failed");

    assert!(inbox.join("photo.png").exists());
    assert!(!inbox.join("media").exists());
    assert!(!MoveHistory::file_path(&inbox).exists());
}

#[test]
fn test_cli_organize_with_backup() {
    let fixture = TestFixture::new();
    let inbox = fixture.path().join("inbox");
    fs::create_dir(&inbox).unwrap();
    fs::write(inbox.join("report.pdf"), PDF_HEADER).unwrap();

    fixture
        .run_cli(&["organize", inbox.to_str().unwrap(), "--backup"])
        .expect("organize failed");

    let backup = fs::read_dir(fixture.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("inbox_backup_"))
        .expect("backup missing");
    assert!(backup.join("report.pdf").exists());
    assert!(inbox.join("document/report.pdf").exists());
}

#[test]
fn test_cli_backup_and_restore() {
    let fixture = TestFixture::new();
    fixture.create_text_file("project/a.txt", "a");
    fixture.create_text_file("project/sub/b.txt", "b");
    let project = fixture.path().join("project");

    fixture
        .run_cli(&["backup", project.to_str().unwrap()])
        .expect("backup failed");
    let backup = fs::read_dir(fixture.path())
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.path())
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("project_backup_"))
        .expect("backup missing");

    fs::remove_dir_all(project.join("sub")).unwrap();
    fs::write(project.join("a.txt"), "changed").unwrap();

    let unconfirmed = fixture.run_cli(&[
        "restore",
        backup.to_str().unwrap(),
        project.to_str().unwrap(),
    ]);
    assert!(matches!(unconfirmed, Err(CliError::ConfirmationRequired(_))));
    assert_eq!(fixture.read("project/a.txt"), "changed");

    fixture
        .run_cli(&[
            "restore",
            backup.to_str().unwrap(),
            project.to_str().unwrap(),
            "--yes",
        ])
        .expect("restore failed");
    assert_eq!(fixture.read("project/a.txt"), "a");
    assert_eq!(fixture.read("project/sub/b.txt"), "b");
}

#[test]
fn test_cli_cleanup_removes_only_empty_folders() {
    let fixture = TestFixture::new();
    fs::create_dir_all(fixture.path().join("a/b/c")).unwrap();
    fixture.create_text_file("keep/file.txt", "x");

    fixture
        .run_cli(&["cleanup", fixture.path().to_str().unwrap()])
        .expect("cleanup failed");

    fixture.assert_not_exists("a");
    fixture.assert_dir_exists("keep");
    fixture.assert_file_exists("keep/file.txt");
}

#[test]
fn test_cli_organize_missing_directory_fails() {
    let fixture = TestFixture::new();
    let missing = fixture.path().join("missing");

    let result = fixture.run_cli(&["organize", missing.to_str().unwrap()]);

    assert!(matches!(result, Err(CliError::Pipeline(_))));
}

#[test]
fn test_restore_backup_into_missing_original() {
    let fixture = TestFixture::new();
    fixture.create_text_file("project/a.txt", "a");
    let project = fixture.path().join("project");
    let backup = Reorganizer::create_backup(&project).expect("backup failed");
    fs::remove_dir_all(&project).unwrap();

    Reorganizer::restore_backup(&backup, &project).expect("restore failed");

    assert_eq!(fixture.read("project/a.txt"), "a");
}
