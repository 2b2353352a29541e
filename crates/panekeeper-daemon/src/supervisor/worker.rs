use chrono::{DateTime, Utc};
use panekeeper_types::{
    HealthMetrics, PanekeeperError, PanekeeperResult, ProcessError, RecoveryStrategy,
    WorkerStatus,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::metrics::{ErrorCounter, ResponseTimeTracker};

/// One supervised pane. Lives in the `WorkerRegistry` and is only mutated
/// through registry updates.
#[derive(Clone, Debug)]
pub struct WorkerProcess {
    pub pane_id: String,
    pub process_id: Option<u32>,
    pub session_id: Option<String>,
    pub working_directory: PathBuf,
    pub status: WorkerStatus,
    pub start_time: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Recovery restarts. Only grows, except through a manual clear.
    pub restart_count: u32,
    pub preventive_restarts: u32,
    pub health: HealthMetrics,
    pub response_times: ResponseTimeTracker,
    pub errors: ErrorCounter,
    pub consecutive_failures: u32,
    pub last_error: Option<ProcessError>,
    pub last_strategy: Option<RecoveryStrategy>,
    /// Set when the restart limit was reached; recovery stays off until cleared.
    pub manual_intervention: Option<String>,
    pub restart_pending: bool,
    pub last_restart_at: Option<Instant>,
    pub resumed_from: Option<String>,
    pub(crate) launched_at: Instant,
    pub(crate) status_since: Instant,
    /// Bumped on every launch so delayed restarts can tell they went stale.
    pub(crate) generation: u64,
}

impl WorkerProcess {
    pub fn new(
        pane_id: &str,
        working_directory: impl AsRef<Path>,
        cpu_history_size: usize,
        response_history_size: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            pane_id: pane_id.to_string(),
            process_id: None,
            session_id: None,
            working_directory: working_directory.as_ref().to_path_buf(),
            status: WorkerStatus::Starting,
            start_time: Utc::now(),
            last_heartbeat: None,
            restart_count: 0,
            preventive_restarts: 0,
            health: HealthMetrics::new(cpu_history_size),
            response_times: ResponseTimeTracker::new(response_history_size),
            errors: ErrorCounter::new(),
            consecutive_failures: 0,
            last_error: None,
            last_strategy: None,
            manual_intervention: None,
            restart_pending: false,
            last_restart_at: None,
            resumed_from: None,
            launched_at: now,
            status_since: now,
            generation: 0,
        }
    }

    /// Move to `next` if the state machine allows it. Re-entering the current
    /// state is a no-op.
    pub fn transition(&mut self, next: WorkerStatus) -> PanekeeperResult<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(PanekeeperError::InvalidTransition(format!(
                "{}: {} -> {}",
                self.pane_id, self.status, next
            )));
        }
        debug!("Worker {} {} -> {}", self.pane_id, self.status, next);
        self.status = next;
        self.status_since = Instant::now();
        Ok(())
    }

    pub fn time_in_status(&self) -> Duration {
        self.status_since.elapsed()
    }

    pub fn uptime(&self) -> Duration {
        self.launched_at.elapsed()
    }

    pub fn is_held(&self) -> bool {
        self.manual_intervention.is_some()
    }

    pub fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            pane_id: self.pane_id.clone(),
            process_id: self.process_id,
            session_id: self.session_id.clone(),
            working_directory: self.working_directory.clone(),
            status: self.status,
            start_time: self.start_time,
            last_heartbeat: self.last_heartbeat,
            restart_count: self.restart_count,
            preventive_restarts: self.preventive_restarts,
            uptime_secs: self.uptime().as_secs(),
            memory_usage_mb: self.health.memory_usage_mb,
            cpu_usage_percent: self.health.cpu_usage_percent,
            error_count: self.errors.total_errors(),
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
            manual_intervention: self.manual_intervention.clone(),
            resumed_from: self.resumed_from.clone(),
        }
    }
}

/// Serializable status line for one worker.
#[derive(Clone, Debug, Serialize)]
pub struct WorkerSummary {
    pub pane_id: String,
    pub process_id: Option<u32>,
    pub session_id: Option<String>,
    pub working_directory: PathBuf,
    pub status: WorkerStatus,
    pub start_time: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub restart_count: u32,
    pub preventive_restarts: u32,
    pub uptime_secs: u64,
    pub memory_usage_mb: f64,
    pub cpu_usage_percent: f64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub manual_intervention: Option<String>,
    pub resumed_from: Option<String>,
}
