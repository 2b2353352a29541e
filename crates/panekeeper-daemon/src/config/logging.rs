use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::types::LogLevel;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Relative paths are taken from the data directory.
    pub file: Option<PathBuf>,
    pub json: bool,
    pub source_location: bool,
    /// Extra `EnvFilter` directives, e.g. `panekeeper_daemon::ipc=trace`.
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            json: false,
            source_location: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Filter string for the given `-v` count; `quiet` drops to warnings.
    pub fn filter(&self, verbosity: u8, quiet: bool) -> String {
        let base = if quiet {
            "warn".to_string()
        } else {
            match verbosity {
                0 => self.level.to_string(),
                1 => format!("{},panekeeper_daemon=debug", self.level),
                2 => "debug".to_string(),
                _ => "trace".to_string(),
            }
        };

        self.directives
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .fold(base, |filter, directive| format!("{},{}", filter, directive))
    }

    pub fn log_path(&self, data_dir: &Path) -> Option<PathBuf> {
        self.file.as_ref().map(|file| {
            if file.is_relative() {
                data_dir.join(file)
            } else {
                file.clone()
            }
        })
    }
}
