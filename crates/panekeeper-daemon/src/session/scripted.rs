use async_trait::async_trait;
use panekeeper_types::{PanekeeperError, PanekeeperResult};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::transport::{ProcessProbe, SessionRead, SessionTransport};

const READ_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// How probes for sessions spawned in a given directory behave.
#[derive(Clone, Debug, PartialEq)]
pub enum ProbeMode {
    Healthy { memory_mb: f64, cpu_percent: f64 },
    /// Never answers; the caller's timeout decides.
    Hang,
    /// The process has exited with the given code.
    Dead(Option<i32>),
    /// The transport reports a broken connection.
    Disconnected,
}

impl Default for ProbeMode {
    fn default() -> Self {
        ProbeMode::Healthy {
            memory_mb: 128.0,
            cpu_percent: 5.0,
        }
    }
}

struct ScriptedSession {
    working_directory: PathBuf,
    pid: u32,
    started: Instant,
    output: VecDeque<Vec<u8>>,
    closed: bool,
    written: Vec<u8>,
}

#[derive(Default)]
struct ScriptState {
    sessions: HashMap<String, ScriptedSession>,
    modes: HashMap<PathBuf, ProbeMode>,
    failing_spawns: HashSet<PathBuf>,
    spawns: HashMap<PathBuf, u32>,
    terminated: Vec<String>,
    next_id: u32,
}

/// In-memory transport driven by tests. Behaviour is keyed by the working
/// directory a session was spawned in, so each pane can be scripted
/// independently. Writes are echoed back as output.
#[derive(Default)]
pub struct ScriptedTransport {
    state: Mutex<ScriptState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&self, working_directory: impl AsRef<Path>, mode: ProbeMode) {
        self.state
            .lock()
            .modes
            .insert(working_directory.as_ref().to_path_buf(), mode);
    }

    pub fn fail_spawns(&self, working_directory: impl AsRef<Path>, fail: bool) {
        let dir = working_directory.as_ref().to_path_buf();
        let mut state = self.state.lock();
        if fail {
            state.failing_spawns.insert(dir);
        } else {
            state.failing_spawns.remove(&dir);
        }
    }

    pub fn spawn_count(&self, working_directory: impl AsRef<Path>) -> u32 {
        self.state
            .lock()
            .spawns
            .get(working_directory.as_ref())
            .copied()
            .unwrap_or(0)
    }

    pub fn terminated(&self) -> Vec<String> {
        self.state.lock().terminated.clone()
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn written(&self, session_id: &str) -> Option<String> {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .map(|s| String::from_utf8_lossy(&s.written).into_owned())
    }

    /// Close the output stream of every session spawned in the directory.
    pub fn close_output(&self, working_directory: impl AsRef<Path>) {
        let dir = working_directory.as_ref();
        for session in self.state.lock().sessions.values_mut() {
            if session.working_directory == dir {
                session.closed = true;
            }
        }
    }

    fn mode_for(&self, session_id: &str) -> PanekeeperResult<(ProbeMode, u32, Instant)> {
        let state = self.state.lock();
        let session = state
            .sessions
            .get(session_id)
            .ok_or_else(|| PanekeeperError::NotFound(format!("session {}", session_id)))?;
        let mode = state
            .modes
            .get(&session.working_directory)
            .cloned()
            .unwrap_or_default();
        Ok((mode, session.pid, session.started))
    }
}

#[async_trait]
impl SessionTransport for ScriptedTransport {
    async fn spawn(&self, working_directory: &Path) -> PanekeeperResult<String> {
        let mut state = self.state.lock();
        *state.spawns.entry(working_directory.to_path_buf()).or_insert(0) += 1;

        if state.failing_spawns.contains(working_directory) {
            return Err(PanekeeperError::Session(format!(
                "scripted spawn failure in {:?}",
                working_directory
            )));
        }

        state.next_id += 1;
        let id = format!("scripted-{}", state.next_id);
        let pid = 40_000 + state.next_id;
        state.sessions.insert(
            id.clone(),
            ScriptedSession {
                working_directory: working_directory.to_path_buf(),
                pid,
                started: Instant::now(),
                output: VecDeque::new(),
                closed: false,
                written: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn write(&self, session_id: &str, bytes: &[u8]) -> PanekeeperResult<()> {
        let (mode, _, _) = self.mode_for(session_id)?;
        if matches!(mode, ProbeMode::Dead(_) | ProbeMode::Disconnected) {
            return Err(PanekeeperError::Ipc("broken pipe".into()));
        }

        let mut state = self.state.lock();
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.written.extend_from_slice(bytes);
            session.output.push_back(bytes.to_vec());
        }
        Ok(())
    }

    async fn read(&self, session_id: &str) -> PanekeeperResult<SessionRead> {
        loop {
            {
                let mut state = self.state.lock();
                let session = state
                    .sessions
                    .get_mut(session_id)
                    .ok_or_else(|| PanekeeperError::NotFound(format!("session {}", session_id)))?;
                if let Some(chunk) = session.output.pop_front() {
                    return Ok(SessionRead::Data(chunk));
                }
                if session.closed {
                    return Ok(SessionRead::Eof);
                }
            }
            tokio::time::sleep(READ_POLL_INTERVAL).await;
        }
    }

    async fn terminate(&self, session_id: &str) -> PanekeeperResult<()> {
        let mut state = self.state.lock();
        state
            .sessions
            .remove(session_id)
            .ok_or_else(|| PanekeeperError::NotFound(format!("session {}", session_id)))?;
        state.terminated.push(session_id.to_string());
        Ok(())
    }

    async fn probe(&self, session_id: &str) -> PanekeeperResult<ProcessProbe> {
        let (mode, pid, started) = self.mode_for(session_id)?;
        let uptime_secs = started.elapsed().as_secs();

        match mode {
            ProbeMode::Healthy {
                memory_mb,
                cpu_percent,
            } => Ok(ProcessProbe {
                pid: Some(pid),
                alive: true,
                exit_code: None,
                memory_mb,
                cpu_percent,
                uptime_secs,
            }),
            ProbeMode::Hang => {
                std::future::pending::<()>().await;
                Err(PanekeeperError::Timeout(0))
            }
            ProbeMode::Dead(exit_code) => Ok(ProcessProbe {
                pid: Some(pid),
                alive: false,
                exit_code,
                uptime_secs,
                ..Default::default()
            }),
            ProbeMode::Disconnected => Err(PanekeeperError::Ipc("connection reset".into())),
        }
    }
}
