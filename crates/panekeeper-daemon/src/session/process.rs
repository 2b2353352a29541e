use async_trait::async_trait;
use panekeeper_types::{PanekeeperError, PanekeeperResult};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::transport::{ProcessProbe, SessionRead, SessionTransport};
use crate::config::SessionConfig;

const READ_CHUNK_SIZE: usize = 4096;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

struct ProcessSession {
    pid: Option<u32>,
    started: Instant,
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    stdout: tokio::sync::Mutex<Option<ChildStdout>>,
}

/// Runs each session as a child process with piped stdio.
pub struct ProcessTransport {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Arc<ProcessSession>>>,
    system: Mutex<System>,
}

impl ProcessTransport {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            system: Mutex::new(System::new()),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    fn session(&self, session_id: &str) -> PanekeeperResult<Arc<ProcessSession>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| PanekeeperError::NotFound(format!("session {}", session_id)))
    }

    fn sample_resources(&self, pid: u32) -> (f64, f64) {
        let mut system = self.system.lock();
        let pid = Pid::from_u32(pid);
        system.refresh_process(pid);
        system
            .process(pid)
            .map(|p| (p.memory() as f64 / BYTES_PER_MB, p.cpu_usage() as f64))
            .unwrap_or((0.0, 0.0))
    }

    #[cfg(unix)]
    fn request_exit(pid: Option<u32>) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid as NixPid;

        if let Some(pid) = pid {
            if let Err(e) = kill(NixPid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!("SIGTERM to {} failed: {}", pid, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn request_exit(_pid: Option<u32>) {}
}

fn map_io(context: &str, e: std::io::Error) -> PanekeeperError {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::UnexpectedEof => PanekeeperError::Ipc(format!("{}: {}", context, e)),
        _ => PanekeeperError::Session(format!("{}: {}", context, e)),
    }
}

#[async_trait]
impl SessionTransport for ProcessTransport {
    async fn spawn(&self, working_directory: &Path) -> PanekeeperResult<String> {
        let mut command = Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .envs(&self.config.env)
            .current_dir(working_directory)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            PanekeeperError::Session(format!(
                "Failed to spawn '{}' in {:?}: {}",
                self.config.command, working_directory, e
            ))
        })?;

        let session_id = Uuid::new_v4().to_string();
        let pid = child.id();
        let session = ProcessSession {
            pid,
            started: Instant::now(),
            stdin: tokio::sync::Mutex::new(child.stdin.take()),
            stdout: tokio::sync::Mutex::new(child.stdout.take()),
            child: tokio::sync::Mutex::new(child),
        };

        self.sessions.write().insert(session_id.clone(), Arc::new(session));
        info!(
            "Spawned session {} ({} pid={:?}) in {:?}",
            session_id, self.config.command, pid, working_directory
        );

        Ok(session_id)
    }

    async fn write(&self, session_id: &str, bytes: &[u8]) -> PanekeeperResult<()> {
        let session = self.session(session_id)?;
        let mut guard = session.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| PanekeeperError::Ipc("stdin closed".into()))?;
        stdin.write_all(bytes).await.map_err(|e| map_io("write", e))?;
        stdin.flush().await.map_err(|e| map_io("flush", e))?;
        Ok(())
    }

    async fn read(&self, session_id: &str) -> PanekeeperResult<SessionRead> {
        let session = self.session(session_id)?;
        let mut guard = session.stdout.lock().await;
        let Some(stdout) = guard.as_mut() else {
            return Ok(SessionRead::Eof);
        };

        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        let n = stdout.read(&mut buf).await.map_err(|e| map_io("read", e))?;
        if n == 0 {
            *guard = None;
            return Ok(SessionRead::Eof);
        }
        buf.truncate(n);
        Ok(SessionRead::Data(buf))
    }

    async fn terminate(&self, session_id: &str) -> PanekeeperResult<()> {
        let session = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| PanekeeperError::NotFound(format!("session {}", session_id)))?;

        session.stdin.lock().await.take();
        Self::request_exit(session.pid);

        let grace = Duration::from_millis(self.config.terminate_grace_ms);
        let mut child = session.child.lock().await;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Session {} exited with {}", session_id, status);
            }
            Ok(Err(e)) => {
                warn!("Failed waiting on session {}: {}", session_id, e);
            }
            Err(_) => {
                warn!("Session {} did not exit within {:?}, killing", session_id, grace);
                child
                    .kill()
                    .await
                    .map_err(|e| PanekeeperError::Session(format!("kill failed: {}", e)))?;
            }
        }

        info!("Terminated session {}", session_id);
        Ok(())
    }

    async fn probe(&self, session_id: &str) -> PanekeeperResult<ProcessProbe> {
        let session = self.session(session_id)?;
        let uptime_secs = session.started.elapsed().as_secs();

        let exit = {
            let mut child = session.child.lock().await;
            child
                .try_wait()
                .map_err(|e| PanekeeperError::Session(format!("wait failed: {}", e)))?
        };

        if let Some(status) = exit {
            return Ok(ProcessProbe {
                pid: session.pid,
                alive: false,
                exit_code: status.code(),
                uptime_secs,
                ..Default::default()
            });
        }

        let (memory_mb, cpu_percent) = session
            .pid
            .map(|pid| self.sample_resources(pid))
            .unwrap_or((0.0, 0.0));

        Ok(ProcessProbe {
            pid: session.pid,
            alive: true,
            exit_code: None,
            memory_mb,
            cpu_percent,
            uptime_secs,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn transport(command: &str, args: &[&str]) -> ProcessTransport {
        ProcessTransport::new(SessionConfig {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            terminate_grace_ms: 500,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_echo_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport("cat", &[]);
        let session = transport.spawn(dir.path()).await.unwrap();

        transport.write(&session, b"hello\n").await.unwrap();
        let read = tokio::time::timeout(Duration::from_secs(5), transport.read(&session))
            .await
            .expect("read timed out")
            .unwrap();
        match read {
            SessionRead::Data(bytes) => assert_eq!(String::from_utf8_lossy(&bytes), "hello\n"),
            SessionRead::Eof => panic!("unexpected eof"),
        }

        let probe = transport.probe(&session).await.unwrap();
        assert!(probe.alive);
        assert!(probe.pid.is_some());

        transport.terminate(&session).await.unwrap();
        assert_eq!(transport.active_sessions(), 0);
        assert!(matches!(
            transport.probe(&session).await,
            Err(PanekeeperError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_exit_code_reported() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport("sh", &["-c", "exit 3"]);
        let session = transport.spawn(dir.path()).await.unwrap();

        assert_eq!(transport.read(&session).await.unwrap(), SessionRead::Eof);

        let mut probe = transport.probe(&session).await.unwrap();
        for _ in 0..50 {
            if !probe.alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            probe = transport.probe(&session).await.unwrap();
        }
        assert!(!probe.alive);
        assert_eq!(probe.exit_code, Some(3));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport = transport("/nonexistent/panekeeper-agent", &[]);
        assert!(matches!(
            transport.spawn(dir.path()).await,
            Err(PanekeeperError::Session(_))
        ));
    }
}
