use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a supervised pane worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Starting,
    Running,
    Unhealthy,
    Crashed,
    Stopping,
}

impl WorkerStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `Crashed -> Starting` is the recovery restart edge and `Running ->
    /// Starting` the preventive recycle of a healthy worker. `Stopping` is
    /// terminal; the entry is removed once the session confirms termination.
    pub fn can_transition_to(&self, next: WorkerStatus) -> bool {
        use WorkerStatus::*;
        match (self, next) {
            (Starting, Running) | (Starting, Crashed) | (Starting, Stopping) => true,
            (Running, Unhealthy) | (Running, Crashed) | (Running, Stopping) => true,
            (Running, Starting) => true,
            (Unhealthy, Running) | (Unhealthy, Crashed) | (Unhealthy, Stopping) => true,
            (Crashed, Starting) | (Crashed, Stopping) => true,
            _ => false,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, WorkerStatus::Starting | WorkerStatus::Running | WorkerStatus::Unhealthy)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Starting => write!(f, "starting"),
            WorkerStatus::Running => write!(f, "running"),
            WorkerStatus::Unhealthy => write!(f, "unhealthy"),
            WorkerStatus::Crashed => write!(f, "crashed"),
            WorkerStatus::Stopping => write!(f, "stopping"),
        }
    }
}

/// Fault taxonomy for a worker that reached `Crashed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessError {
    StartupFailure { reason: String },
    CommunicationFailure { last_known_state: WorkerStatus },
    ResourceExhaustion { resource_name: String },
    UnresponsiveProcess { unresponsive_ms: u64 },
    CorruptedSession { session_id: String },
    NetworkConnectivityLoss,
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::StartupFailure { reason } => write!(f, "startup failure: {}", reason),
            ProcessError::CommunicationFailure { last_known_state } => {
                write!(f, "communication failure (last state: {})", last_known_state)
            }
            ProcessError::ResourceExhaustion { resource_name } => {
                write!(f, "resource exhaustion: {}", resource_name)
            }
            ProcessError::UnresponsiveProcess { unresponsive_ms } => {
                write!(f, "unresponsive for {}ms", unresponsive_ms)
            }
            ProcessError::CorruptedSession { session_id } => {
                write!(f, "corrupted session {}", session_id)
            }
            ProcessError::NetworkConnectivityLoss => write!(f, "network connectivity lost"),
        }
    }
}

/// The supervisor's response to a crashed worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryStrategy {
    DelayedRestart { delay_ms: u64 },
    ImmediateRestart,
    ManualIntervention { reason: String },
}

impl RecoveryStrategy {
    pub fn restarts(&self) -> bool {
        !matches!(self, RecoveryStrategy::ManualIntervention { .. })
    }

    pub fn delay_ms(&self) -> u64 {
        match self {
            RecoveryStrategy::DelayedRestart { delay_ms } => *delay_ms,
            _ => 0,
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStrategy::DelayedRestart { delay_ms } => {
                write!(f, "delayed restart ({}ms)", delay_ms)
            }
            RecoveryStrategy::ImmediateRestart => write!(f, "immediate restart"),
            RecoveryStrategy::ManualIntervention { reason } => {
                write!(f, "manual intervention: {}", reason)
            }
        }
    }
}

/// Bucket an error is tallied under in a worker's error counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Ipc,
    Crash,
    Timeout,
    Other,
}

impl FromStr for ErrorCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "ipc" => ErrorCategory::Ipc,
            "crash" => ErrorCategory::Crash,
            "timeout" => ErrorCategory::Timeout,
            _ => ErrorCategory::Other,
        })
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Ipc => write!(f, "ipc"),
            ErrorCategory::Crash => write!(f, "crash"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Other => write!(f, "other"),
        }
    }
}
