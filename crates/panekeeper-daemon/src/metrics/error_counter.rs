use chrono::{DateTime, Utc};
use panekeeper_types::ErrorCategory;
use std::time::{Duration, Instant};

/// Error rates are reported per minute, measured over at least this window so
/// a single early error does not read as a burst.
pub const ERROR_RATE_MIN_WINDOW: Duration = Duration::from_secs(60);

/// Per-worker error tally. Counts only grow; a fresh counter is created when a
/// worker entry is recreated.
#[derive(Clone, Debug)]
pub struct ErrorCounter {
    total_errors: u64,
    ipc_errors: u64,
    process_crashes: u64,
    timeout_errors: u64,
    last_error_time: Option<DateTime<Utc>>,
    created_at: Instant,
}

impl ErrorCounter {
    pub fn new() -> Self {
        Self {
            total_errors: 0,
            ipc_errors: 0,
            process_crashes: 0,
            timeout_errors: 0,
            last_error_time: None,
            created_at: Instant::now(),
        }
    }

    pub fn increment(&mut self, category: ErrorCategory) {
        self.total_errors += 1;
        match category {
            ErrorCategory::Ipc => self.ipc_errors += 1,
            ErrorCategory::Crash => self.process_crashes += 1,
            ErrorCategory::Timeout => self.timeout_errors += 1,
            ErrorCategory::Other => {}
        }
        self.last_error_time = Some(Utc::now());
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors
    }

    pub fn ipc_errors(&self) -> u64 {
        self.ipc_errors
    }

    pub fn process_crashes(&self) -> u64 {
        self.process_crashes
    }

    pub fn timeout_errors(&self) -> u64 {
        self.timeout_errors
    }

    pub fn last_error_time(&self) -> Option<DateTime<Utc>> {
        self.last_error_time
    }

    /// Errors per minute since the counter was created.
    pub fn error_rate(&self) -> f64 {
        let window = self.created_at.elapsed().max(ERROR_RATE_MIN_WINDOW);
        self.total_errors as f64 / (window.as_secs_f64() / 60.0)
    }
}

impl Default for ErrorCounter {
    fn default() -> Self {
        Self::new()
    }
}
