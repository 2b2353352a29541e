use async_trait::async_trait;
use panekeeper_types::PanekeeperResult;
use std::path::Path;

/// One read from a session's output stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionRead {
    Data(Vec<u8>),
    Eof,
}

/// Liveness and resource reading for the process behind a session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessProbe {
    pub pid: Option<u32>,
    pub alive: bool,
    pub exit_code: Option<i32>,
    pub memory_mb: f64,
    pub cpu_percent: f64,
    pub uptime_secs: u64,
}

/// Spawns and streams the wrapped interactive CLI.
///
/// Errors follow a convention the IPC channel relies on when classifying
/// failures: `NotFound` for an unknown session id, `Ipc` for a broken
/// connection to the process, anything else for a failed operation.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn spawn(&self, working_directory: &Path) -> PanekeeperResult<String>;

    async fn write(&self, session_id: &str, bytes: &[u8]) -> PanekeeperResult<()>;

    async fn read(&self, session_id: &str) -> PanekeeperResult<SessionRead>;

    async fn terminate(&self, session_id: &str) -> PanekeeperResult<()>;

    async fn probe(&self, session_id: &str) -> PanekeeperResult<ProcessProbe>;
}
