use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpuUsageStats {
    pub current: f64,
    pub average: f64,
    /// Most recent sample first.
    pub history: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeStats {
    pub average_ms: f64,
    pub recent_history: Vec<f64>,
    pub pending_requests: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    pub total_errors: u64,
    pub ipc_errors: u64,
    pub process_crashes: u64,
    pub timeout_errors: u64,
    pub error_rate: f64,
    pub last_error_time: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    UnknownWorker,
    NoSamples,
}

/// Outcome of a metrics query. Missing data is a normal answer, not an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum StatsResult<T> {
    Available(T),
    Unavailable(UnavailableReason),
}

impl<T> StatsResult<T> {
    pub fn available(self) -> Option<T> {
        match self {
            StatsResult::Available(v) => Some(v),
            StatsResult::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, StatsResult::Available(_))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FleetSummary {
    pub workers: usize,
    pub starting: usize,
    pub running: usize,
    pub unhealthy: usize,
    pub crashed: usize,
    pub stopping: usize,
    pub average_cpu_percent: f64,
    pub total_memory_mb: f64,
    pub average_response_ms: f64,
    pub pending_requests: usize,
    pub total_errors: u64,
    pub total_restarts: u64,
}
