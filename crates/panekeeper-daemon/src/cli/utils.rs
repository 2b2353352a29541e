use super::commands::Cli;
use panekeeper_daemon::LoggingConfig;
use panekeeper_types::{PanekeeperError, PanekeeperResult};
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `RUST_LOG` wins over the CLI flags, which win over the config file.
pub fn init_logging(cli: &Cli, logging: &LoggingConfig, data_dir: &Path) -> PanekeeperResult<()> {
    let level = logging.filter(cli.verbose, cli.quiet);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::registry().with(env_filter);
    let source = logging.source_location;

    match cli.log_file.clone().or_else(|| logging.log_path(data_dir)) {
        Some(log_file) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .map_err(|e| {
                    PanekeeperError::Config(format!("Failed to open log file {:?}: {}", log_file, e))
                })?;
            let writer = std::sync::Mutex::new(file);
            if logging.json {
                let file_layer = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_file(source)
                    .with_line_number(source);
                subscriber.with(file_layer).init();
            } else {
                let file_layer = fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_file(source)
                    .with_line_number(source);
                subscriber.with(file_layer).init();
            }
        }
        None => {
            if logging.json {
                let stdout_layer = fmt::layer()
                    .json()
                    .with_file(source)
                    .with_line_number(source);
                subscriber.with(stdout_layer).init();
            } else {
                let stdout_layer = fmt::layer()
                    .with_target(cli.verbose >= 2)
                    .with_file(source)
                    .with_line_number(source);
                subscriber.with(stdout_layer).init();
            }
        }
    }

    Ok(())
}

pub fn show_version() {
    println!("panekeeper {}", BUILD_VERSION);
    println!("  target:  {}-{}", std::env::consts::ARCH, std::env::consts::OS);
    println!("  session: {}", panekeeper_daemon::config::DEFAULT_SESSION_COMMAND);
}
