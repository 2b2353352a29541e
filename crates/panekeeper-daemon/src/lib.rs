#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod ipc;
pub mod metrics;
pub mod persistence;
pub mod session;
pub mod supervisor;

pub use config::{
    default_data_dir, BackoffMode, DaemonConfig, LogLevel, LoggingConfig, SessionConfig,
    SupervisorConfig, WorkerSpec,
};
pub use ipc::{ChannelStats, IpcChannel, OutputEvent};
pub use metrics::{
    CpuUsageStats, ErrorCounter, ErrorStatistics, FleetSummary, MetricsCollector,
    ResponseTimeStats, ResponseTimeTracker, StatsResult, UnavailableReason,
};
pub use persistence::{JsonFileStore, SessionSnapshot, SessionStore};
pub use session::{ProcessProbe, ProcessTransport, SessionRead, SessionTransport};
pub use supervisor::{
    select_recovery_strategy, CancellationToken, HealthMonitor, RecoveryPolicy, Supervisor,
    SupervisorStats, WorkerProcess, WorkerRegistry, WorkerSummary,
};
