use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::health::HealthMetrics;

/// Supervisor to worker commands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcCommand {
    StartSession { pane_id: String, working_directory: String },
    StopSession { pane_id: String },
    SendInput { pane_id: String, text: String },
    ReceiveOutput { pane_id: String, text: String },
    Heartbeat { pane_id: String, timestamp: DateTime<Utc> },
    ProcessCrashed { pane_id: String, exit_code: Option<i32> },
    ResourceAlert { pane_id: String, resource_name: String, value: f64 },
    HealthCheck { pane_id: String },
}

impl IpcCommand {
    pub fn pane_id(&self) -> &str {
        match self {
            IpcCommand::StartSession { pane_id, .. }
            | IpcCommand::StopSession { pane_id }
            | IpcCommand::SendInput { pane_id, .. }
            | IpcCommand::ReceiveOutput { pane_id, .. }
            | IpcCommand::Heartbeat { pane_id, .. }
            | IpcCommand::ProcessCrashed { pane_id, .. }
            | IpcCommand::ResourceAlert { pane_id, .. }
            | IpcCommand::HealthCheck { pane_id } => pane_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IpcCommand::StartSession { .. } => "start_session",
            IpcCommand::StopSession { .. } => "stop_session",
            IpcCommand::SendInput { .. } => "send_input",
            IpcCommand::ReceiveOutput { .. } => "receive_output",
            IpcCommand::Heartbeat { .. } => "heartbeat",
            IpcCommand::ProcessCrashed { .. } => "process_crashed",
            IpcCommand::ResourceAlert { .. } => "resource_alert",
            IpcCommand::HealthCheck { .. } => "health_check",
        }
    }

    pub fn heartbeat(pane_id: &str) -> Self {
        IpcCommand::Heartbeat {
            pane_id: pane_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn health_check(pane_id: &str) -> Self {
        IpcCommand::HealthCheck {
            pane_id: pane_id.to_string(),
        }
    }
}

impl fmt::Display for IpcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.pane_id())
    }
}

/// Worker to supervisor responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    SessionStarted { pane_id: String, session_id: String },
    SessionStopped { pane_id: String },
    InputReceived { pane_id: String },
    OutputSent { pane_id: String, text: String },
    HeartbeatAck { pane_id: String, timestamp: DateTime<Utc> },
    HealthStatus { pane_id: String, metrics: Box<HealthMetrics> },
    Error { pane_id: String, message: String, kind: IpcErrorKind },
}

/// Why a command produced an `Error` response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpcErrorKind {
    /// The command could not be delivered or executed this time.
    Delivery,
    /// The transport lost its connection to the session.
    Disconnected,
    /// The wrapped process has exited.
    ProcessExited,
    /// The transport no longer knows the session the pane was bound to.
    SessionLost,
    /// No session is bound to the pane.
    UnknownPane,
}

impl IpcErrorKind {
    /// Process-level failures that move a worker straight to `Crashed`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IpcErrorKind::ProcessExited | IpcErrorKind::SessionLost)
    }
}

impl IpcResponse {
    pub fn pane_id(&self) -> &str {
        match self {
            IpcResponse::SessionStarted { pane_id, .. }
            | IpcResponse::SessionStopped { pane_id }
            | IpcResponse::InputReceived { pane_id }
            | IpcResponse::OutputSent { pane_id, .. }
            | IpcResponse::HeartbeatAck { pane_id, .. }
            | IpcResponse::HealthStatus { pane_id, .. }
            | IpcResponse::Error { pane_id, .. } => pane_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, IpcResponse::Error { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, IpcResponse::Error { kind, .. } if kind.is_fatal())
    }

    pub fn error(pane_id: &str, message: impl Into<String>, kind: IpcErrorKind) -> Self {
        IpcResponse::Error {
            pane_id: pane_id.to_string(),
            message: message.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let cmd = IpcCommand::SendInput {
            pane_id: "dev1".into(),
            text: "ls\n".into(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"type\":\"send_input\""));
        assert!(json.contains("\"pane_id\":\"dev1\""));
    }

    #[test]
    fn test_response_accessors() {
        let resp = IpcResponse::error("dev2", "process exited", IpcErrorKind::ProcessExited);
        assert_eq!(resp.pane_id(), "dev2");
        assert!(resp.is_error());
        assert!(resp.is_fatal());

        let ack = IpcResponse::InputReceived { pane_id: "dev2".into() };
        assert!(!ack.is_error());

        let busy = IpcResponse::error("dev2", "write failed", IpcErrorKind::Delivery);
        assert!(busy.is_error());
        assert!(!busy.is_fatal());
    }

    #[test]
    fn test_command_display() {
        assert_eq!(IpcCommand::health_check("p3").to_string(), "health_check(p3)");
    }
}
