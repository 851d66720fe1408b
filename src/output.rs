//! Terminal output for the `sortmind` binary.
//!
//! All user-facing printing goes through [`OutputFormatter`] so the command
//! handlers stay free of styling details. Diagnostic logging goes through
//! `tracing` instead and never mixes with this output.

use crate::organizer::OperationReport;
use crate::pipeline::Stage;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;

/// Consistent styling for status lines, progress and summaries.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a green status line with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sortmind::output::OutputFormatter;
    /// OutputFormatter::success("Moved 12 files");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints a red status line to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a bar measuring pipeline progress in percent.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sortmind::output::OutputFormatter;
    /// use sortmind::pipeline::Stage;
    ///
    /// let pb = OutputFormatter::stage_progress_bar();
    /// OutputFormatter::advance(&pb, Stage::Classifying);
    /// pb.finish_and_clear();
    /// ```
    pub fn stage_progress_bar() -> ProgressBar {
        let pb = ProgressBar::new(u64::from(Stage::Done.percent()));
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Moves `pb` to the milestone of `stage`.
    pub fn advance(pb: &ProgressBar, stage: Stage) {
        pb.set_position(u64::from(stage.percent()));
        pb.set_message(stage.label());
    }

    /// Prints a table of file counts per category.
    ///
    /// Categories without files are left out.
    pub fn summary_table(category_counts: &BTreeMap<String, usize>) {
        Self::header("SUMMARY");

        let rows: Vec<_> = category_counts
            .iter()
            .filter(|&(_, count)| *count > 0)
            .collect();
        let total: usize = rows.iter().map(|&(_, count)| *count).sum();

        let width = rows
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max("Category".len());

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));
        for (category, count) in &rows {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(**count),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total.to_string().green().bold(),
            plural(total),
            width = width
        );
    }

    /// Prints one line per failed item of `report`.
    pub fn failures(report: &OperationReport) {
        if report.failures.is_empty() {
            return;
        }
        Self::header("FAILURES");
        for (path, reason) in &report.failures {
            Self::error(&format!("{}: {}", path.display(), reason));
        }
    }

    /// Prints where a dry run would move a file.
    pub fn planned_move(source: &Path, category: &str) {
        Self::dry_run_notice(&format!("Would move {} -> {}/", source.display(), category));
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}
