mod collector;
mod error_counter;
mod response_time;
mod types;

pub use collector::MetricsCollector;
pub(crate) use collector::{merge_sample, sync_counters};
pub use error_counter::{ErrorCounter, ERROR_RATE_MIN_WINDOW};
pub use response_time::ResponseTimeTracker;
pub use types::{
    CpuUsageStats, ErrorStatistics, FleetSummary, ResponseTimeStats, StatsResult,
    UnavailableReason,
};
