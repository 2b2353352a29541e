use panekeeper_types::{PanekeeperError, PanekeeperResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::logging::LoggingConfig;
use super::session::SessionConfig;
use super::supervisor::{SupervisorConfig, MAX_CPU_LIMIT_PERCENT};
use super::types::{ConfigWarning, LogLevel, WarningSeverity};

/// A worker started automatically when the daemon boots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub pane_id: String,
    pub working_directory: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub supervisor: SupervisorConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    pub workers: Vec<WorkerSpec>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            supervisor: SupervisorConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
            workers: Vec::new(),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".panekeeper"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/panekeeper"))
}

impl DaemonConfig {
    pub fn load(path: impl AsRef<Path>) -> PanekeeperResult<Self> {
        let path = path.as_ref();

        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| PanekeeperError::Config(format!("Failed to read config: {}", e)))?;

            toml::from_str(&contents)
                .map_err(|e| PanekeeperError::Config(format!("Failed to parse config: {}", e)))?
        } else {
            info!("Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PanekeeperResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| PanekeeperError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PanekeeperError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path.as_ref(), contents)
            .map_err(|e| PanekeeperError::Config(format!("Failed to write config: {}", e)))?;

        info!("Configuration saved to {:?}", path.as_ref());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("PANEKEEPER_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        if let Ok(level) = std::env::var("PANEKEEPER_LOG_LEVEL") {
            self.logging.level = LogLevel::parse_lossy(&level);
        }

        if std::env::var("PANEKEEPER_LOG_JSON").is_ok() {
            self.logging.json = true;
        }

        if let Ok(command) = std::env::var("PANEKEEPER_SESSION_COMMAND") {
            if !command.trim().is_empty() {
                self.session.command = command;
            }
        }

        if let Ok(max) = std::env::var("PANEKEEPER_MAX_RESTARTS") {
            if let Ok(m) = max.parse() {
                self.supervisor.max_restarts = m;
            }
        }

        if let Ok(ms) = std::env::var("PANEKEEPER_HEARTBEAT_MS") {
            if let Ok(v) = ms.parse() {
                self.supervisor.heartbeat_interval_ms = v;
            }
        }
    }

    pub fn validate(&self) -> PanekeeperResult<()> {
        let sup = &self.supervisor;

        if sup.heartbeat_interval_ms == 0 {
            return Err(PanekeeperError::Config("Heartbeat interval cannot be 0".into()));
        }

        if sup.health_check_timeout_ms == 0 {
            return Err(PanekeeperError::Config("Health check timeout cannot be 0".into()));
        }

        if sup.health_check_timeout_ms >= sup.heartbeat_interval_ms {
            return Err(PanekeeperError::Config(format!(
                "Health check timeout ({}ms) must be shorter than the heartbeat interval ({}ms)",
                sup.health_check_timeout_ms, sup.heartbeat_interval_ms
            )));
        }

        if sup.memory_limit_mb <= 0.0 {
            return Err(PanekeeperError::Config("Memory limit must be positive".into()));
        }

        if sup.cpu_limit_percent <= 0.0 || sup.cpu_limit_percent > MAX_CPU_LIMIT_PERCENT {
            return Err(PanekeeperError::Config(format!(
                "CPU limit must be in (0, {}]",
                MAX_CPU_LIMIT_PERCENT
            )));
        }

        if sup.max_consecutive_failures == 0 {
            return Err(PanekeeperError::Config(
                "max_consecutive_failures must be at least 1".into(),
            ));
        }

        if sup.cpu_history_size == 0 || sup.response_history_size == 0 {
            return Err(PanekeeperError::Config("History sizes must be at least 1".into()));
        }

        if self.session.command.trim().is_empty() {
            return Err(PanekeeperError::Config("Session command cannot be empty".into()));
        }

        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.pane_id.trim().is_empty() {
                return Err(PanekeeperError::Config("Worker pane_id cannot be empty".into()));
            }
            if !seen.insert(worker.pane_id.as_str()) {
                return Err(PanekeeperError::Config(format!(
                    "Duplicate worker pane_id: {}",
                    worker.pane_id
                )));
            }
        }

        Ok(())
    }

    pub fn check_warnings(&self) -> Vec<ConfigWarning> {
        let sup = &self.supervisor;
        let mut warnings = Vec::new();

        if sup.max_restarts == 0 {
            warnings.push(ConfigWarning {
                severity: WarningSeverity::High,
                message: "max_restarts is 0: every crash requires manual intervention.".into(),
                recommendation: "Set supervisor.max_restarts to a small positive value (e.g. 3).".into(),
            });
        }

        if sup.restart_cooldown_ms < sup.health_check_timeout_ms {
            warnings.push(ConfigWarning {
                severity: WarningSeverity::Medium,
                message: format!(
                    "Restart cooldown ({}ms) is shorter than the health check timeout ({}ms).",
                    sup.restart_cooldown_ms, sup.health_check_timeout_ms
                ),
                recommendation: "Raise supervisor.restart_cooldown_ms to avoid restart storms.".into(),
            });
        }

        if let Some(interval) = sup.preventive_restart_interval() {
            if interval < sup.heartbeat_interval() * 10 {
                warnings.push(ConfigWarning {
                    severity: WarningSeverity::Medium,
                    message: "Preventive restart interval is very short relative to the heartbeat.".into(),
                    recommendation: "Preventive restarts are meant for long-term drift; use hours, not seconds.".into(),
                });
            }
        }

        if sup.session_persistence_enabled {
            warnings.push(ConfigWarning {
                severity: WarningSeverity::Low,
                message: format!(
                    "Session snapshots are written to {:?}.",
                    self.data_dir.join("sessions")
                ),
                recommendation: "Snapshots may contain terminal output; protect the data directory.".into(),
            });
        }

        warnings
    }

    pub fn log_warnings(&self) {
        let warnings = self.check_warnings();
        if warnings.is_empty() {
            info!("Configuration check passed - no warnings");
            return;
        }

        for warning in &warnings {
            match warning.severity {
                WarningSeverity::High => {
                    warn!("{}", warning.message);
                    warn!("  -> {}", warning.recommendation);
                }
                WarningSeverity::Medium => {
                    warn!("{}", warning.message);
                    info!("  -> {}", warning.recommendation);
                }
                WarningSeverity::Low => {
                    info!("Note: {}", warning.message);
                }
            }
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn redacted(&self) -> RedactedConfig {
        RedactedConfig {
            data_dir: self.data_dir.clone(),
            session_command: self.session.command.clone(),
            session_arg_count: self.session.args.len(),
            session_env_keys: self.session.env.keys().cloned().collect(),
            heartbeat_interval_ms: self.supervisor.heartbeat_interval_ms,
            health_check_timeout_ms: self.supervisor.health_check_timeout_ms,
            memory_limit_mb: self.supervisor.memory_limit_mb,
            cpu_limit_percent: self.supervisor.cpu_limit_percent,
            max_restarts: self.supervisor.max_restarts,
            restart_backoff: self.supervisor.restart_backoff.to_string(),
            persistence: self.supervisor.session_persistence_enabled,
            workers: self.workers.iter().map(|w| w.pane_id.clone()).collect(),
        }
    }
}

/// Display form that lists env var names but never their values.
#[derive(Debug, Serialize)]
pub struct RedactedConfig {
    pub data_dir: PathBuf,
    pub session_command: String,
    pub session_arg_count: usize,
    pub session_env_keys: Vec<String>,
    pub heartbeat_interval_ms: u64,
    pub health_check_timeout_ms: u64,
    pub memory_limit_mb: f64,
    pub cpu_limit_percent: f64,
    pub max_restarts: u32,
    pub restart_backoff: String,
    pub persistence: bool,
    pub workers: Vec<String>,
}

impl std::fmt::Display for RedactedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Panekeeper Configuration")?;
        writeln!(f, "========================")?;
        writeln!(f, "Data dir: {:?}", self.data_dir)?;
        writeln!(f, "Session: {} ({} args)", self.session_command, self.session_arg_count)?;
        if !self.session_env_keys.is_empty() {
            writeln!(f, "Session env: {}", self.session_env_keys.join(", "))?;
        }
        writeln!(f, "Heartbeat: {}ms (timeout {}ms)", self.heartbeat_interval_ms, self.health_check_timeout_ms)?;
        writeln!(f, "Limits: {:.0} MB / {:.1}% CPU", self.memory_limit_mb, self.cpu_limit_percent)?;
        writeln!(f, "Restarts: max {} ({} backoff)", self.max_restarts, self.restart_backoff)?;
        writeln!(f, "Persistence: {}", if self.persistence { "ON" } else { "OFF" })?;
        writeln!(f, "Workers: {}", if self.workers.is_empty() { "-".to_string() } else { self.workers.join(", ") })?;
        Ok(())
    }
}
