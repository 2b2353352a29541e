#![forbid(unsafe_code)]
#![warn(clippy::all)]

mod error;
mod health;
mod ipc;
mod ring;
mod worker;

pub use error::{PanekeeperError, PanekeeperResult};
pub use health::{HealthMetrics, MemoryTrend, MEMORY_TREND_TOLERANCE};
pub use ipc::{IpcCommand, IpcErrorKind, IpcResponse};
pub use ring::CircularBuffer;
pub use worker::{ErrorCategory, ProcessError, RecoveryStrategy, WorkerStatus};

pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

pub const DEFAULT_RESPONSE_HISTORY_CAPACITY: usize = 100;

pub const MAX_RESTART_LIMIT_REASON: &str = "Max restart limit exceeded";
