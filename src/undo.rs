//! Undo support for reorganization runs.
//!
//! A [`MoveHistory`] is replayed newest-first, moving every file from its
//! recorded target back to its original source path. Problems with single
//! records are reported, never fatal, so an already-undone or partially failed
//! history can be replayed safely.

use crate::organizer::{
    MoveHistory, MoveRecord, OperationReport, OrganizeError, OrganizeResult, Reorganizer,
};
use std::fs;
use std::path::{Path, PathBuf};

/// Replays move histories in reverse.
pub struct UndoManager;

impl UndoManager {
    /// Moves every recorded file back to its original location.
    ///
    /// Records are processed in reverse order. A record whose target no longer
    /// exists is reported in `error`; parent directories of the original
    /// location are created on demand. If another file now occupies the original
    /// location it is renamed aside with a `.bak.<timestamp>` suffix first.
    ///
    /// Report entries are the paths the files were restored from.
    pub fn undo(history: &MoveHistory) -> OperationReport {
        let mut report = OperationReport::new();

        for record in history.records.iter().rev() {
            match Self::restore_file(record) {
                Ok(()) => {
                    tracing::info!(
                        from = %record.target_path.display(),
                        to = %record.source_path.display(),
                        "undid move"
                    );
                    report.record_success(record.target_path.clone());
                }
                Err(reason) => {
                    tracing::error!(path = %record.target_path.display(), "{}", reason);
                    report.record_failure(record.target_path.clone(), reason);
                }
            }
        }

        report
    }

    /// Undoes the history persisted in `base_path`.
    ///
    /// The history file is deleted only if every record was restored, so a
    /// partially failed undo can be retried after fixing the cause.
    ///
    /// # Errors
    ///
    /// Fails if the base path does not exist, or if there is no readable history.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sortmind::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// match UndoManager::undo_from_history_file(Path::new("/path/to/directory")) {
    ///     Ok(report) => println!("Restored {} files", report.success.len()),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo_from_history_file(base_path: &Path) -> OrganizeResult<OperationReport> {
        if !base_path.is_dir() {
            return Err(OrganizeError::InvalidBasePath {
                path: base_path.to_path_buf(),
                reason: "base path does not exist".to_string(),
            });
        }

        let history = MoveHistory::load(base_path)?.ok_or_else(|| {
            OrganizeError::HistoryReadFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no previous organization found to undo",
            ))
        })?;

        let report = Self::undo(&history);

        if report.is_complete_success()
            && let Err(e) = MoveHistory::delete(base_path)
        {
            tracing::warn!("could not delete history file: {}", e);
        }

        Ok(report)
    }

    fn restore_file(record: &MoveRecord) -> Result<(), String> {
        if !record.target_path.exists() {
            return Err("file not found at expected location".to_string());
        }

        if record.source_path.exists() {
            let backup_path = Self::generate_backup_path(&record.source_path);
            fs::rename(&record.source_path, &backup_path)
                .map_err(|e| format!("could not back up conflicting file: {}", e))?;
            tracing::warn!(
                path = %record.source_path.display(),
                backup = %backup_path.display(),
                "original location occupied, moved aside"
            );
        }

        Reorganizer::move_file(&record.target_path, &record.source_path, false)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// `file.txt` becomes `file.txt.bak.20251109-143052`.
    fn generate_backup_path(original_path: &Path) -> PathBuf {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let filename = original_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());

        let backup_name = format!("{}.bak.{}", filename, timestamp);
        match original_path.parent() {
            Some(parent) => parent.join(backup_name),
            None => PathBuf::from(backup_name),
        }
    }
}
