//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; the binary calls [`init`] once to
//! install a subscriber with two sinks:
//! - a plain-text file `sortmind.log` in the configured log directory, filtered by
//!   `SORTMIND_LOG` or the configured level
//! - a console layer on stderr, quiet by default so it does not duplicate the
//!   regular command output
//!
//! If the log directory cannot be created, the console layer takes over the
//! file layer's filter so nothing is lost.

use crate::config::LoggingConfig;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable overriding the configured file log filter.
pub const LOG_ENV_VAR: &str = "SORTMIND_LOG";
pub const LOG_FILE_NAME: &str = "sortmind.log";

/// How chatty the console sink should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    fn console_level(self) -> LevelFilter {
        match self {
            Verbosity::Quiet => LevelFilter::ERROR,
            Verbosity::Normal => LevelFilter::WARN,
            Verbosity::Verbose => LevelFilter::DEBUG,
        }
    }
}

/// Keeps the file sink flushing until dropped.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn file_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Calling it again is a no-op.
pub fn init(config: &LoggingConfig, verbosity: Verbosity) -> LogGuard {
    let sink_error = fs::create_dir_all(&config.directory).err();

    let (file_layer, guard) = if sink_error.is_none() {
        let appender = tracing_appender::rolling::never(&config.directory, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_filter(file_filter(config));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let console_filter = if sink_error.is_some() && verbosity != Verbosity::Quiet {
        file_filter(config)
    } else {
        EnvFilter::default().add_directive(verbosity.console_level().into())
    };
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed && let Some(e) = sink_error {
        tracing::warn!(
            directory = %config.directory.display(),
            "cannot open log file, logging to console only: {}",
            e
        );
    }

    LogGuard { _file: guard }
}
