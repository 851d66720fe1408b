//! Command-line interface for sortmind.
//!
//! Argument parsing is declared with clap here; [`run`] dispatches a parsed
//! [`Cli`] to one handler per subcommand. Handlers print through
//! [`OutputFormatter`] and return a [`CliError`] that the binary turns into a
//! non-zero exit status.

use crate::classifier::Classifier;
use crate::config::{AppConfig, ConfigError};
use crate::extractor::MetadataExtractor;
use crate::logging::Verbosity;
use crate::organizer::{OrganizeError, Reorganizer};
use crate::output::OutputFormatter;
use crate::pipeline::{Pipeline, PipelineError};
use crate::rules::{CategoryRule, RuleSet, RulesError};
use crate::undo::UndoManager;
use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "sortmind")]
#[command(about = "Sorts a directory into category folders, reversibly", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to .sortmindrc.toml, then ~/.config/sortmind/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Category mapping store, overriding the configured one
    #[arg(long, global = true)]
    pub mappings: Option<PathBuf>,

    /// Print debug logs to the console
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print errors to the console
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.verbose {
            Verbosity::Verbose
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    /// The mapping store to use: `--mappings`, else the configured path.
    pub fn mappings_path(&self, config: &AppConfig) -> PathBuf {
        self.mappings
            .clone()
            .unwrap_or_else(|| config.store.mappings.clone())
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Move the files of a directory into category folders
    Organize {
        dir: PathBuf,
        /// Show what would be moved without touching anything
        #[arg(long)]
        dry_run: bool,
        /// Keep folders that end up empty
        #[arg(long)]
        no_cleanup: bool,
        /// Copy the directory aside before organizing
        #[arg(long)]
        backup: bool,
    },
    /// Revert the last organization of a directory
    Undo { dir: PathBuf },
    /// List the files of a directory with their metadata and category
    Scan {
        dir: PathBuf,
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove empty folders below a directory
    Cleanup { dir: PathBuf },
    /// Copy a directory to a timestamped sibling
    Backup { dir: PathBuf },
    /// Replace a directory with a backup of it
    Restore {
        backup: PathBuf,
        original: PathBuf,
        /// Confirm that the current contents of ORIGINAL may be deleted
        #[arg(long)]
        yes: bool,
    },
    /// Inspect or change category rules
    Rules {
        #[command(subcommand)]
        action: RulesCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum RulesCommand {
    /// Print the active category rules
    Show,
    /// Create a category or add signatures to an existing one
    Set {
        key: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "ext")]
        extensions: Vec<String>,
        #[arg(long = "mime")]
        mime_types: Vec<String>,
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Organize(#[from] OrganizeError),
    #[error(transparent)]
    Rules(#[from] RulesError),
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("restoring deletes the current contents of {}; pass --yes to confirm", .0.display())]
    ConfirmationRequired(PathBuf),
    #[error("{failed} item(s) could not be processed")]
    Incomplete { failed: usize },
}

pub type CliResult<T> = Result<T, CliError>;

/// Executes the parsed command line.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use sortmind::cli::{Cli, run};
/// use sortmind::config::AppConfig;
///
/// let cli = Cli::parse_from(["sortmind", "organize", "/path/to/downloads", "--dry-run"]);
/// let config = AppConfig::load(cli.config.as_deref()).unwrap_or_default();
/// if let Err(e) = run(&cli, &config) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run(cli: &Cli, config: &AppConfig) -> CliResult<()> {
    let mappings = cli.mappings_path(config);

    match &cli.command {
        Command::Organize {
            dir,
            dry_run,
            no_cleanup,
            backup,
        } => {
            let pipeline = build_pipeline(config, &mappings, *no_cleanup)?;
            if *dry_run {
                organize_dry_run(&pipeline, dir)
            } else {
                organize(pipeline, dir, *backup)
            }
        }
        Command::Undo { dir } => undo(dir),
        Command::Scan { dir, json } => scan(config, &mappings, dir, *json),
        Command::Cleanup { dir } => cleanup(dir),
        Command::Backup { dir } => backup(dir),
        Command::Restore {
            backup,
            original,
            yes,
        } => restore(backup, original, *yes),
        Command::Rules { action } => match action {
            RulesCommand::Show => show_rules(&mappings),
            RulesCommand::Set {
                key,
                name,
                extensions,
                mime_types,
                keywords,
            } => set_rule(&mappings, key, name.as_deref(), extensions, mime_types, keywords),
        },
    }
}

fn build_pipeline(config: &AppConfig, mappings: &Path, no_cleanup: bool) -> CliResult<Pipeline> {
    let filters = config.compile_filters()?;
    let classifier = Classifier::new(RuleSet::load_or_default(mappings));
    let pipeline = Pipeline::new(classifier, Some(filters));
    Ok(if no_cleanup {
        pipeline.without_cleanup()
    } else {
        pipeline
    })
}

fn organize(pipeline: Pipeline, dir: &Path, backup: bool) -> CliResult<()> {
    OutputFormatter::info(&format!("Organizing contents of: {}", dir.display()));

    if backup {
        let backup_path = Reorganizer::create_backup(dir)?;
        OutputFormatter::success(&format!("Backup created at {}", backup_path.display()));
    }

    let pb = OutputFormatter::stage_progress_bar();
    let result = pipeline
        .spawn(dir.to_path_buf())?
        .wait(|stage| OutputFormatter::advance(&pb, stage));
    pb.finish_and_clear();
    let result = result?;

    OutputFormatter::success(&format!(
        "Organization complete: {} of {} files moved",
        result.history.len(),
        result.scanned
    ));
    OutputFormatter::summary_table(&result.category_counts);

    if !result.removed_dirs.is_empty() {
        OutputFormatter::info(&format!(
            "Removed {} empty folder(s)",
            result.removed_dirs.len()
        ));
    }
    if result.history_file.is_some() {
        OutputFormatter::info(&format!(
            "History saved. Use 'sortmind undo {}' to revert changes.",
            dir.display()
        ));
    } else if !result.history.is_empty() {
        OutputFormatter::warning("History could not be saved; undo will not be available.");
    }

    OutputFormatter::failures(&result.report);
    if result.report.is_complete_success() {
        Ok(())
    } else {
        Err(CliError::Incomplete {
            failed: result.report.error.len(),
        })
    }
}

fn organize_dry_run(pipeline: &Pipeline, dir: &Path) -> CliResult<()> {
    OutputFormatter::dry_run_notice(&format!("Analyzing contents of: {}", dir.display()));

    let buckets = pipeline.plan(dir)?;
    let mut counts = BTreeMap::new();
    for (category, files) in &buckets {
        for file in files {
            OutputFormatter::planned_move(&file.path, category);
        }
        counts.insert(category.clone(), files.len());
    }

    OutputFormatter::summary_table(&counts);
    OutputFormatter::success("Dry run complete. No files were modified.");
    Ok(())
}

fn undo(dir: &Path) -> CliResult<()> {
    OutputFormatter::info("Undoing previous organization...");

    let report = UndoManager::undo_from_history_file(dir)?;
    OutputFormatter::success(&format!("Restored {} file(s)", report.success.len()));

    if report.is_complete_success() {
        return Ok(());
    }
    OutputFormatter::failures(&report);
    OutputFormatter::warning("History file was kept. Fix the issues above and run undo again.");
    Err(CliError::Incomplete {
        failed: report.error.len(),
    })
}

fn scan(config: &AppConfig, mappings: &Path, dir: &Path, json: bool) -> CliResult<()> {
    if !dir.is_dir() {
        return Err(CliError::NotADirectory(dir.to_path_buf()));
    }

    let extractor = MetadataExtractor::with_filters(config.compile_filters()?);
    let files = extractor.scan_directory(dir);

    if json {
        OutputFormatter::plain(&serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    let classifier = Classifier::new(RuleSet::load_or_default(mappings));
    for file in &files {
        OutputFormatter::plain(&format!(
            " - {} ({}, {} bytes) -> {}",
            file.name,
            file.mime_type,
            file.size,
            classifier.classify(file)
        ));
        if let Some(version) = &file.version_info.version_number {
            OutputFormatter::plain(&format!("     version {}", version));
        }
    }
    OutputFormatter::info(&format!("{} file(s) found", files.len()));
    Ok(())
}

fn cleanup(dir: &Path) -> CliResult<()> {
    if !dir.is_dir() {
        return Err(CliError::NotADirectory(dir.to_path_buf()));
    }

    let removed = Reorganizer::cleanup_empty_folders(dir);
    for path in &removed {
        OutputFormatter::plain(&format!(" - {}", path.display()));
    }
    OutputFormatter::success(&format!("Removed {} empty folder(s)", removed.len()));
    Ok(())
}

fn backup(dir: &Path) -> CliResult<()> {
    let backup_path = Reorganizer::create_backup(dir)?;
    OutputFormatter::success(&format!("Backup created at {}", backup_path.display()));
    Ok(())
}

fn restore(backup: &Path, original: &Path, confirmed: bool) -> CliResult<()> {
    if !confirmed {
        return Err(CliError::ConfirmationRequired(original.to_path_buf()));
    }

    Reorganizer::restore_backup(backup, original)?;
    OutputFormatter::success(&format!(
        "Restored {} from {}",
        original.display(),
        backup.display()
    ));
    Ok(())
}

fn show_rules(mappings: &Path) -> CliResult<()> {
    let rules = RuleSet::load_or_default(mappings);
    OutputFormatter::info(&format!("Category mappings: {}", mappings.display()));

    for (key, rule) in rules.iter() {
        OutputFormatter::header(&format!("{} ({})", key, rule.display_name));
        print_set("extensions", &rule.extensions);
        print_set("mime types", &rule.mime_prefixes);
        print_set("keywords", &rule.keywords);
    }
    Ok(())
}

fn print_set(label: &str, values: &BTreeSet<String>) {
    if values.is_empty() {
        return;
    }
    let joined: Vec<&str> = values.iter().map(String::as_str).collect();
    OutputFormatter::plain(&format!("  {}: {}", label, joined.join(", ")));
}

fn set_rule(
    mappings: &Path,
    key: &str,
    name: Option<&str>,
    extensions: &[String],
    mime_types: &[String],
    keywords: &[String],
) -> CliResult<()> {
    let mut classifier =
        Classifier::with_store(RuleSet::load_or_default(mappings), mappings.to_path_buf());

    let mut rule = classifier
        .rules()
        .get(key)
        .cloned()
        .unwrap_or_else(|| CategoryRule::named(key));
    if let Some(name) = name {
        rule.display_name = name.to_string();
    }
    rule.extensions.extend(extensions.iter().cloned());
    rule.mime_prefixes.extend(mime_types.iter().cloned());
    rule.keywords.extend(keywords.iter().cloned());

    classifier.update_rules(BTreeMap::from([(key.to_string(), rule)]))?;
    OutputFormatter::success(&format!(
        "Category '{}' saved to {}",
        key,
        mappings.display()
    ));
    Ok(())
}
