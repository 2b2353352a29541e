use panekeeper_types::{DEFAULT_HISTORY_CAPACITY, DEFAULT_RESPONSE_HISTORY_CAPACITY};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::BackoffMode;

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_RESTART_DELAY_MS: u64 = 5_000;
pub const DEFAULT_MAX_RESTARTS: u32 = 3;
pub const MAX_CPU_LIMIT_PERCENT: f64 = 1000.0;

/// Thresholds and cadences for the health monitor and recovery policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub heartbeat_interval_ms: u64,
    pub memory_limit_mb: f64,
    pub cpu_limit_percent: f64,
    pub max_restarts: u32,
    pub restart_cooldown_ms: u64,
    pub health_check_timeout_ms: u64,
    /// Zero disables preventive restarts.
    pub preventive_restart_interval_ms: u64,
    pub session_persistence_enabled: bool,
    pub max_consecutive_failures: u32,
    pub restart_delay_ms: u64,
    pub restart_backoff: BackoffMode,
    pub max_restart_delay_ms: u64,
    pub cpu_history_size: usize,
    pub response_history_size: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            memory_limit_mb: 2048.0,
            cpu_limit_percent: 90.0,
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_cooldown_ms: 5_000,
            health_check_timeout_ms: DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
            preventive_restart_interval_ms: 0,
            session_persistence_enabled: false,
            max_consecutive_failures: 2,
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
            restart_backoff: BackoffMode::Fixed,
            max_restart_delay_ms: 60_000,
            cpu_history_size: DEFAULT_HISTORY_CAPACITY,
            response_history_size: DEFAULT_RESPONSE_HISTORY_CAPACITY,
        }
    }
}

impl SupervisorConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_millis(self.restart_cooldown_ms)
    }

    pub fn preventive_restart_interval(&self) -> Option<Duration> {
        if self.preventive_restart_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.preventive_restart_interval_ms))
        }
    }
}
