//! Physical reorganization of files into category directories.
//!
//! This module moves classified files into `<base>/<category>/` subdirectories,
//! resolves name conflicts without ever overwriting an existing file, removes
//! directories left empty by the moves, and provides whole-directory backup and
//! restore. Every successful move is recorded in a [`MoveHistory`] that can be
//! persisted next to the organized files and replayed by [`crate::undo`].

use crate::classifier::CategorizedBuckets;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File name of the persisted move history inside an organized directory.
pub const HISTORY_FILE_NAME: &str = ".sortmind_history.json";

/// Format of the suffix appended to conflicting file names and backups.
const CONFLICT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Errors that can occur during reorganization.
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
    #[error("failed to move {from} to {to}: {source}")]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("failed to remove existing target {path}: {source}")]
    OverwriteFailed { path: PathBuf, source: io::Error },
    #[error("invalid base path {path}: {reason}")]
    InvalidBasePath { path: PathBuf, reason: String },
    #[error("failed to copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
    #[error("backup {path} is not a directory")]
    InvalidBackup { path: PathBuf },
    #[error("backup {backup} and target {original} overlap")]
    OverlappingBackup { backup: PathBuf, original: PathBuf },
    #[error("failed to remove {path}: {source}")]
    RemoveFailed { path: PathBuf, source: io::Error },
    #[error("failed to write history file: {0}")]
    HistoryWriteFailed(io::Error),
    #[error("failed to read history file: {0}")]
    HistoryReadFailed(io::Error),
    #[error("invalid history file format: {0}")]
    InvalidHistoryFormat(#[from] serde_json::Error),
}

/// Result type for reorganization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// One relocation performed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Where the file was before the move. Undo restores it here.
    pub source_path: PathBuf,
    /// Where the file was moved to.
    pub target_path: PathBuf,
    pub category: String,
}

/// Ordered log of the moves of one organization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveHistory {
    pub timestamp: DateTime<Utc>,
    pub base_path: PathBuf,
    pub records: Vec<MoveRecord>,
}

impl MoveHistory {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            timestamp: Utc::now(),
            base_path,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: MoveRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Path of the history file for a base directory.
    pub fn file_path(base_path: &Path) -> PathBuf {
        base_path.join(HISTORY_FILE_NAME)
    }

    /// Saves this history as pretty JSON inside `base_path`.
    pub fn save(&self, base_path: &Path) -> OrganizeResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(Self::file_path(base_path), json).map_err(OrganizeError::HistoryWriteFailed)
    }

    /// Loads the history saved in `base_path`, if any.
    pub fn load(base_path: &Path) -> OrganizeResult<Option<Self>> {
        let history_path = Self::file_path(base_path);
        if !history_path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&history_path).map_err(OrganizeError::HistoryReadFailed)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Deletes the history file of `base_path` if it exists.
    pub fn delete(base_path: &Path) -> OrganizeResult<()> {
        let history_path = Self::file_path(base_path);
        if history_path.exists() {
            fs::remove_file(&history_path).map_err(OrganizeError::HistoryWriteFailed)?;
        }
        Ok(())
    }
}

/// Per-item outcome of a bulk operation.
///
/// Every processed file ends up in exactly one of `success` or `error`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationReport {
    pub success: Vec<PathBuf>,
    pub error: Vec<PathBuf>,
    /// Human-readable reason for each entry of `error`, in the same order.
    pub failures: Vec<(PathBuf, String)>,
}

impl OperationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, path: PathBuf) {
        self.success.push(path);
    }

    pub fn record_failure(&mut self, path: PathBuf, reason: impl Into<String>) {
        self.failures.push((path.clone(), reason.into()));
        self.error.push(path);
    }

    pub fn total_processed(&self) -> usize {
        self.success.len() + self.error.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// Result of [`Reorganizer::organize`].
#[derive(Debug, Clone)]
pub struct OrganizeOutcome {
    pub report: OperationReport,
    pub history: MoveHistory,
}

/// Moves files into category subdirectories and manages backups.
pub struct Reorganizer;

impl Reorganizer {
    /// Materializes `buckets` below `base_path`.
    ///
    /// One subdirectory per bucket key is created (existing ones are reused),
    /// then every descriptor is moved to `<base_path>/<key>/<file name>`. Moves
    /// are independent: a failure is recorded in the report and the next file is
    /// processed. A file that already sits at its target is left alone and
    /// counted as a success without a history record.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sortmind::classifier::Classifier;
    /// use sortmind::extractor::MetadataExtractor;
    /// use sortmind::organizer::Reorganizer;
    /// use sortmind::rules::RuleSet;
    /// use std::path::Path;
    ///
    /// let base = Path::new("/path/to/downloads");
    /// let files = MetadataExtractor::new().scan_directory(base);
    /// let buckets = Classifier::new(RuleSet::default()).batch_classify(files);
    /// let outcome = Reorganizer::organize(base, &buckets);
    /// println!("moved {}, failed {}", outcome.report.success.len(), outcome.report.error.len());
    /// ```
    pub fn organize(base_path: &Path, buckets: &CategorizedBuckets) -> OrganizeOutcome {
        let mut report = OperationReport::new();
        let mut history = MoveHistory::new(base_path.to_path_buf());

        for category in buckets.keys() {
            let category_path = base_path.join(category);
            if category_path.is_dir() {
                continue;
            }
            match fs::create_dir_all(&category_path) {
                Ok(()) => tracing::info!(path = %category_path.display(), "created category folder"),
                Err(e) => tracing::error!(path = %category_path.display(), "failed to create category folder: {}", e),
            }
        }

        for (category, descriptors) in buckets {
            let category_path = base_path.join(category);

            for descriptor in descriptors {
                let source = &descriptor.path;
                let target = category_path.join(&descriptor.name);

                if *source == target {
                    tracing::debug!(path = %source.display(), "already organized");
                    report.record_success(source.clone());
                    continue;
                }

                match Self::move_file(source, &target, false) {
                    Ok(final_target) => {
                        report.record_success(source.clone());
                        history.push(MoveRecord {
                            source_path: source.clone(),
                            target_path: final_target,
                            category: category.clone(),
                        });
                    }
                    Err(e) => {
                        tracing::error!("{}", e);
                        report.record_failure(source.clone(), e.to_string());
                    }
                }
            }
        }

        tracing::info!(
            moved = report.success.len(),
            failed = report.error.len(),
            "organization finished"
        );
        OrganizeOutcome { report, history }
    }

    /// Moves `source` to `target` and returns the path it ended up at.
    ///
    /// Missing parent directories of `target` are created. When `target` exists
    /// it is removed first if `overwrite` is set; otherwise the file is renamed
    /// with a timestamp suffix (see [`Reorganizer::conflict_free_path`]).
    pub fn move_file(source: &Path, target: &Path, overwrite: bool) -> OrganizeResult<PathBuf> {
        if source == target {
            return Ok(target.to_path_buf());
        }

        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|source| OrganizeError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut target = target.to_path_buf();
        if target.exists() {
            if overwrite {
                if target.is_dir() {
                    return Err(OrganizeError::OverwriteFailed {
                        path: target,
                        source: io::Error::new(
                            io::ErrorKind::IsADirectory,
                            "refusing to replace a directory",
                        ),
                    });
                }
                fs::remove_file(&target).map_err(|source| OrganizeError::OverwriteFailed {
                    path: target.clone(),
                    source,
                })?;
            } else {
                target = Self::conflict_free_path(&target);
            }
        }

        rename_or_copy(source, &target)?;
        tracing::info!(from = %source.display(), to = %target.display(), "moved file");
        Ok(target)
    }

    /// Returns a free sibling of `target` named `<stem>_<YYYYMMDD_HHMMSS><ext>`.
    ///
    /// If that name is taken too (two conflicts within the same second), a
    /// counter is appended after the timestamp: `<stem>_<timestamp>_1<ext>`.
    pub fn conflict_free_path(target: &Path) -> PathBuf {
        let timestamp = Local::now().format(CONFLICT_TIMESTAMP_FORMAT).to_string();
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = target
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let parent = target.parent().unwrap_or_else(|| Path::new(""));

        let mut candidate = parent.join(format!("{}_{}{}", stem, timestamp, extension));
        let mut counter = 1;
        while candidate.exists() {
            candidate = parent.join(format!("{}_{}_{}{}", stem, timestamp, counter, extension));
            counter += 1;
        }
        candidate
    }

    /// Removes every directory below `path` that is empty, children first.
    ///
    /// `path` itself is kept. Directories that cannot be inspected or removed are
    /// logged and skipped. Returns the removed directories.
    pub fn cleanup_empty_folders(path: &Path) -> Vec<PathBuf> {
        let mut removed = Vec::new();

        for entry in WalkDir::new(path).min_depth(1).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("failed to walk {}: {}", path.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let dir = entry.path();
            let is_empty = match fs::read_dir(dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(e) => {
                    tracing::warn!(path = %dir.display(), "failed to inspect folder: {}", e);
                    continue;
                }
            };
            if !is_empty {
                continue;
            }

            match fs::remove_dir(dir) {
                Ok(()) => {
                    tracing::info!(path = %dir.display(), "removed empty folder");
                    removed.push(dir.to_path_buf());
                }
                Err(e) => tracing::warn!(path = %dir.display(), "failed to remove folder: {}", e),
            }
        }

        removed
    }

    /// Copies the directory `path` to the sibling `<name>_backup_<YYYYMMDD_HHMMSS>`.
    ///
    /// `path` is resolved first, so `dir/` and `.` are backed up next to the
    /// directory they name, never inside it. Returns the backup location.
    pub fn create_backup(path: &Path) -> OrganizeResult<PathBuf> {
        let invalid = |reason: String| OrganizeError::InvalidBasePath {
            path: path.to_path_buf(),
            reason,
        };

        let source = fs::canonicalize(path).map_err(|e| invalid(e.to_string()))?;
        if !source.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }
        let (Some(parent), Some(name)) = (source.parent(), source.file_name()) else {
            return Err(invalid("cannot back up a filesystem root".to_string()));
        };
        let name = name.to_string_lossy();

        let timestamp = Local::now().format(CONFLICT_TIMESTAMP_FORMAT).to_string();
        let mut backup_path = parent.join(format!("{}_backup_{}", name, timestamp));
        let mut counter = 1;
        while backup_path.exists() {
            backup_path = parent.join(format!("{}_backup_{}_{}", name, timestamp, counter));
            counter += 1;
        }
        if backup_path.starts_with(&source) {
            return Err(invalid("backup would be created inside the source".to_string()));
        }

        copy_dir_recursive(&source, &backup_path)?;
        tracing::info!(backup = %backup_path.display(), "created backup");
        Ok(backup_path)
    }

    /// Replaces `original_path` with a copy of `backup_path`.
    ///
    /// The current contents of `original_path` are deleted first and cannot be
    /// recovered except from the backup itself. A backup nested inside the
    /// original, or the other way round, is rejected before anything is deleted.
    pub fn restore_backup(backup_path: &Path, original_path: &Path) -> OrganizeResult<()> {
        if !backup_path.is_dir() {
            return Err(OrganizeError::InvalidBackup {
                path: backup_path.to_path_buf(),
            });
        }

        let backup = resolve_path(backup_path);
        let original = resolve_path(original_path);
        if backup.starts_with(&original) || original.starts_with(&backup) {
            return Err(OrganizeError::OverlappingBackup { backup, original });
        }

        if original.exists() {
            remove_path(&original)?;
        }

        copy_dir_recursive(&backup, &original)?;
        tracing::info!(
            backup = %backup.display(),
            original = %original.display(),
            "restored backup"
        );
        Ok(())
    }
}

/// Absolute, symlink-free form of `path`, which need not exist yet.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or(absolute.clone()),
        _ => absolute,
    }
}

fn remove_path(path: &Path) -> OrganizeResult<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|source| OrganizeError::OverwriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Renames, falling back to copy and delete across filesystems.
fn rename_or_copy(source: &Path, target: &Path) -> OrganizeResult<()> {
    match fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            let removal = if source.is_dir() {
                copy_dir_recursive(source, target)?;
                fs::remove_dir_all(source)
            } else {
                fs::copy(source, target).map_err(|copy_error| OrganizeError::CopyFailed {
                    from: source.to_path_buf(),
                    to: target.to_path_buf(),
                    source: copy_error,
                })?;
                fs::remove_file(source)
            };
            removal.map_err(|e| OrganizeError::RemoveFailed {
                path: source.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(OrganizeError::FileMoveFailure {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            source: e,
        }),
    }
}

fn copy_dir_recursive(from: &Path, to: &Path) -> OrganizeResult<()> {
    let copy_error = |source: io::Error| OrganizeError::CopyFailed {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    fs::create_dir_all(to).map_err(copy_error)?;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| copy_error(e.into()))?;
        let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
        let destination = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination).map_err(copy_error)?;
        } else if entry.path().is_file() {
            fs::copy(entry.path(), &destination).map_err(copy_error)?;
        } else {
            tracing::warn!(path = %entry.path().display(), "skipping non-file entry in copy");
        }
    }
    Ok(())
}
