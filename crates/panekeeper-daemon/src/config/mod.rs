mod daemon;
mod logging;
mod session;
mod supervisor;
mod types;

pub use daemon::{default_data_dir, DaemonConfig, RedactedConfig, WorkerSpec};
pub use logging::LoggingConfig;
pub use session::{SessionConfig, DEFAULT_SESSION_COMMAND};
pub use supervisor::{
    SupervisorConfig, DEFAULT_HEALTH_CHECK_TIMEOUT_MS, DEFAULT_HEARTBEAT_INTERVAL_MS,
    DEFAULT_MAX_RESTARTS, DEFAULT_RESTART_DELAY_MS, MAX_CPU_LIMIT_PERCENT,
};
pub use types::*;
