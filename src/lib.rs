//! sortmind - rule-based, reversible directory organization
//!
//! This library scans a directory, extracts metadata for every file, assigns each
//! file to exactly one category using extension, MIME type and filename keyword
//! rules, and moves files into per-category folders. Every move is recorded so a
//! run can be undone, and whole directories can be backed up and restored.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod extractor;
pub mod logging;
pub mod organizer;
pub mod output;
pub mod pipeline;
pub mod rules;
pub mod undo;

pub use classifier::{CategorizedBuckets, Classifier};
pub use config::{AppConfig, CompiledFilters, ConfigError};
pub use extractor::{FileDescriptor, MetadataExtractor, VersionInfo};
pub use organizer::{MoveHistory, MoveRecord, OperationReport, OrganizeError, Reorganizer};
pub use pipeline::{Pipeline, PipelineError, PipelineEvent, PipelineReport, Stage};
pub use rules::{CategoryRule, RuleSet, RulesError};
pub use undo::UndoManager;
