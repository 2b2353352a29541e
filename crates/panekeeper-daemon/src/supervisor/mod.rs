mod cancellation;
mod core;
mod monitor;
mod recovery;
mod registry;
mod stats;
mod worker;

pub use cancellation::{CancellationSource, CancellationToken};
pub use core::Supervisor;
pub use monitor::{error_for, evaluate_check, CheckContext, CheckResult, HealthMonitor, Verdict};
pub use recovery::{select_recovery_strategy, RecoveryPolicy, RESTART_BACKOFF_MAX_MS};
pub use registry::WorkerRegistry;
pub use stats::SupervisorStats;
pub use worker::{WorkerProcess, WorkerSummary};

#[cfg(test)]
mod tests;
