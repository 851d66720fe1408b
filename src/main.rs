use clap::Parser;
use sortmind::cli::{Cli, CliError, run};
use sortmind::config::AppConfig;
use sortmind::logging;
use sortmind::output::OutputFormatter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            OutputFormatter::error(&format!("Error loading configuration: {}", e));
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = logging::init(&config.logging, cli.verbosity());
    tracing::debug!(command = ?cli.command, "starting");

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Incomplete { failed }) => {
            OutputFormatter::warning(&format!("{} item(s) could not be processed", failed));
            ExitCode::from(2)
        }
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
