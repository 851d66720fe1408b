//! End-to-end organization run.
//!
//! A run goes through fixed stages: scan the base directory, classify what was
//! found, move files into category folders, remove folders left empty, and
//! persist the move history for undo. [`Pipeline::run`] does this on the
//! calling thread and reports each stage to a callback; [`Pipeline::spawn`]
//! runs it on a background thread and publishes [`PipelineEvent`]s over a
//! channel instead.

use crate::classifier::{CategorizedBuckets, Classifier};
use crate::config::CompiledFilters;
use crate::extractor::{FileDescriptor, MetadataExtractor};
use crate::organizer::{HISTORY_FILE_NAME, MoveHistory, OperationReport, Reorganizer};
use std::any::Any;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid base path {path}: {reason}")]
    InvalidBasePath { path: PathBuf, reason: String },
    #[error("failed to start pipeline thread: {0}")]
    Spawn(io::Error),
    #[error("pipeline aborted unexpectedly: {0}")]
    Panicked(String),
    #[error("{0}")]
    Failed(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Milestones of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Scanning,
    Classifying,
    Organizing,
    CleaningUp,
    Done,
}

impl Stage {
    /// Coarse completion percentage reached when the stage starts.
    pub fn percent(self) -> u8 {
        match self {
            Stage::Scanning => 20,
            Stage::Classifying => 40,
            Stage::Organizing => 60,
            Stage::CleaningUp => 80,
            Stage::Done => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Scanning => "Scanning files",
            Stage::Classifying => "Classifying",
            Stage::Organizing => "Moving files",
            Stage::CleaningUp => "Removing empty folders",
            Stage::Done => "Done",
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Canonical form of the organized directory.
    pub base_path: PathBuf,
    pub scanned: usize,
    /// Number of files assigned to each category, including empty ones.
    pub category_counts: BTreeMap<String, usize>,
    pub report: OperationReport,
    pub history: MoveHistory,
    pub removed_dirs: Vec<PathBuf>,
    /// Where the history was saved, if anything was moved and saving worked.
    pub history_file: Option<PathBuf>,
}

/// Message published by a spawned run.
///
/// Zero or more `Progress` events are followed by exactly one terminal
/// `Finished` or `Failed`.
#[derive(Debug)]
pub enum PipelineEvent {
    Progress(Stage),
    Finished(Box<PipelineReport>),
    Failed(String),
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Progress(_))
    }
}

/// A run executing on a background thread.
pub struct PipelineHandle {
    events: Receiver<PipelineEvent>,
    thread: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn events(&self) -> &Receiver<PipelineEvent> {
        &self.events
    }

    /// Drains the remaining events, passing progress to `on_progress`, and
    /// returns the outcome of the run.
    pub fn wait<F>(self, mut on_progress: F) -> PipelineResult<PipelineReport>
    where
        F: FnMut(Stage),
    {
        let mut outcome = Err(PipelineError::Failed(
            "pipeline ended without a result".to_string(),
        ));
        for event in self.events.iter() {
            match event {
                PipelineEvent::Progress(stage) => on_progress(stage),
                PipelineEvent::Finished(report) => outcome = Ok(*report),
                PipelineEvent::Failed(message) => outcome = Err(PipelineError::Failed(message)),
            }
        }
        if self.thread.join().is_err() {
            tracing::error!("pipeline thread panicked after publishing its result");
        }
        outcome
    }
}

/// Scans, classifies and reorganizes one directory.
pub struct Pipeline {
    extractor: MetadataExtractor,
    classifier: Classifier,
    cleanup: bool,
}

impl Pipeline {
    /// Creates a pipeline. Without `filters` every file below the base is a candidate.
    ///
    /// The move history file is excluded from scans either way.
    pub fn new(classifier: Classifier, filters: Option<CompiledFilters>) -> Self {
        let extractor = match filters {
            Some(mut filters) => {
                filters.exclude_filename(HISTORY_FILE_NAME);
                MetadataExtractor::with_filters(filters)
            }
            None => MetadataExtractor::new(),
        };
        Self {
            extractor,
            classifier,
            cleanup: true,
        }
    }

    /// Skips the empty folder cleanup stage.
    pub fn without_cleanup(mut self) -> Self {
        self.cleanup = false;
        self
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Scans and classifies without touching the filesystem.
    pub fn plan(&self, base_path: &Path) -> PipelineResult<CategorizedBuckets> {
        let base = validate_base(base_path)?;
        let files = self.scan(&base);
        Ok(self.classifier.batch_classify(files))
    }

    /// Runs every stage on the current thread, calling `on_progress` as each starts.
    ///
    /// # Errors
    ///
    /// Only an unusable base path is an error. Failures of individual files are
    /// collected in the returned report.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sortmind::classifier::Classifier;
    /// use sortmind::pipeline::Pipeline;
    /// use sortmind::rules::RuleSet;
    /// use std::path::Path;
    ///
    /// let pipeline = Pipeline::new(Classifier::new(RuleSet::default()), None);
    /// let result = pipeline.run(Path::new("/path/to/downloads"), |stage| {
    ///     println!("{}% {}", stage.percent(), stage.label());
    /// });
    /// ```
    pub fn run<F>(&self, base_path: &Path, mut on_progress: F) -> PipelineResult<PipelineReport>
    where
        F: FnMut(Stage),
    {
        let base = validate_base(base_path)?;
        let span = tracing::info_span!("pipeline", base = %base.display());
        let _enter = span.enter();

        on_progress(Stage::Scanning);
        let files = self.scan(&base);
        let scanned = files.len();

        on_progress(Stage::Classifying);
        let buckets = self.classifier.batch_classify(files);
        let category_counts = buckets
            .iter()
            .map(|(category, files)| (category.clone(), files.len()))
            .collect();

        on_progress(Stage::Organizing);
        let outcome = Reorganizer::organize(&base, &buckets);

        on_progress(Stage::CleaningUp);
        let removed_dirs = if self.cleanup {
            Reorganizer::cleanup_empty_folders(&base)
        } else {
            Vec::new()
        };

        // An empty history would hide the previous run from undo.
        let history_file = if outcome.history.is_empty() {
            None
        } else {
            match outcome.history.save(&base) {
                Ok(()) => Some(MoveHistory::file_path(&base)),
                Err(e) => {
                    tracing::warn!("could not save move history: {}", e);
                    None
                }
            }
        };

        on_progress(Stage::Done);
        tracing::info!(
            scanned,
            moved = outcome.history.len(),
            failed = outcome.report.error.len(),
            "pipeline finished"
        );

        Ok(PipelineReport {
            base_path: base,
            scanned,
            category_counts,
            report: outcome.report,
            history: outcome.history,
            removed_dirs,
            history_file,
        })
    }

    /// Runs the pipeline on a background thread.
    pub fn spawn(self, base_path: PathBuf) -> PipelineResult<PipelineHandle> {
        let (sender, events) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("sortmind-pipeline".to_string())
            .spawn(move || {
                let progress = sender.clone();
                let event = run_guarded(|| {
                    self.run(&base_path, |stage| {
                        // The receiver may be gone; the run finishes regardless.
                        let _ = progress.send(PipelineEvent::Progress(stage));
                    })
                });
                let _ = sender.send(event);
            })
            .map_err(PipelineError::Spawn)?;

        Ok(PipelineHandle { events, thread })
    }

    fn scan(&self, base: &Path) -> Vec<FileDescriptor> {
        let history_file = MoveHistory::file_path(base);
        let mut files = self.extractor.scan_directory(base);
        files.retain(|file| file.path != history_file);
        files
    }
}

/// Turns the outcome of `run`, including a panic, into a terminal event.
fn run_guarded<F>(run: F) -> PipelineEvent
where
    F: FnOnce() -> PipelineResult<PipelineReport>,
{
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(Ok(report)) => PipelineEvent::Finished(Box::new(report)),
        Ok(Err(e)) => PipelineEvent::Failed(e.to_string()),
        Err(payload) => {
            let error = PipelineError::Panicked(panic_message(payload.as_ref()));
            tracing::error!("{}", error);
            PipelineEvent::Failed(error.to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn validate_base(base_path: &Path) -> PipelineResult<PathBuf> {
    let invalid = |reason: String| PipelineError::InvalidBasePath {
        path: base_path.to_path_buf(),
        reason,
    };

    let base = fs::canonicalize(base_path).map_err(|e| invalid(e.to_string()))?;
    if !base.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    Ok(base)
}
