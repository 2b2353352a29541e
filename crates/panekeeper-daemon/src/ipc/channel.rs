use chrono::{DateTime, Utc};
use panekeeper_types::{
    HealthMetrics, IpcCommand, IpcErrorKind, IpcResponse, PanekeeperError, PanekeeperResult,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tracing::{debug, info, trace, warn};

use super::stats::{ChannelMetrics, ChannelStats, CommandMetrics};
use super::timer::CommandTimer;
use crate::session::{ProcessProbe, SessionRead, SessionTransport};

pub const OUTPUT_FEED_CAPACITY: usize = 1024;

/// A chunk of worker output relayed through `ReceiveOutput`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub pane_id: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Delivers commands to the session transport and turns every outcome into
/// an `IpcResponse`. Commands for one pane run one at a time on that pane's
/// lane; different panes dispatch in parallel. The channel never retries.
pub struct IpcChannel {
    transport: Arc<dyn SessionTransport>,
    sessions: RwLock<HashMap<String, String>>,
    lanes: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
    metrics: Arc<ChannelMetrics>,
    output_tx: broadcast::Sender<OutputEvent>,
}

impl IpcChannel {
    pub fn new(transport: Arc<dyn SessionTransport>, timeout: Duration) -> Self {
        let (output_tx, _) = broadcast::channel(OUTPUT_FEED_CAPACITY);
        Self {
            transport,
            sessions: RwLock::new(HashMap::new()),
            lanes: Mutex::new(HashMap::new()),
            timeout,
            metrics: Arc::new(ChannelMetrics::new()),
            output_tx,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn session_id(&self, pane_id: &str) -> Option<String> {
        self.sessions.read().get(pane_id).cloned()
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<OutputEvent> {
        self.output_tx.subscribe()
    }

    /// Send with the channel's default deadline.
    pub async fn send(&self, cmd: IpcCommand) -> Option<IpcResponse> {
        self.send_with_timeout(cmd, self.timeout).await
    }

    /// `None` means the command did not complete within `timeout`, including
    /// time spent waiting behind earlier commands for the same pane.
    pub async fn send_with_timeout(
        &self,
        cmd: IpcCommand,
        timeout: Duration,
    ) -> Option<IpcResponse> {
        let kind = cmd.kind();
        let pane_id = cmd.pane_id().to_string();
        let timer = CommandTimer::start(self.metrics.clone(), kind);
        let lane = self.lane(&pane_id);

        let outcome = tokio::time::timeout(timeout, async {
            let _turn = lane.lock().await;
            self.dispatch(cmd).await
        })
        .await;

        match outcome {
            Ok(response) => {
                let elapsed = timer.answered(response.is_error());
                if let IpcResponse::Error { message, kind: error_kind, .. } = &response {
                    debug!("{}({}) failed [{:?}]: {}", kind, pane_id, error_kind, message);
                } else {
                    trace!("{}({}) answered in {:?}", kind, pane_id, elapsed);
                }
                Some(response)
            }
            Err(_) => {
                timer.timed_out();
                warn!("{}({}) timed out after {:?}", kind, pane_id, timeout);
                None
            }
        }
    }

    /// Read the next output chunk of a session. Not serialised on the pane's
    /// lane, so a blocked read never delays commands.
    pub async fn read_output(&self, session_id: &str) -> PanekeeperResult<SessionRead> {
        self.transport.read(session_id).await
    }

    /// OS pid of the process behind a pane, if the transport can tell.
    pub async fn process_id(&self, pane_id: &str) -> Option<u32> {
        let session_id = self.session_id(pane_id)?;
        match tokio::time::timeout(self.timeout, self.transport.probe(&session_id)).await {
            Ok(Ok(probe)) => probe.pid,
            _ => None,
        }
    }

    /// Forget the binding and lane of a pane that left the registry.
    pub fn release(&self, pane_id: &str) {
        self.sessions.write().remove(pane_id);
        self.lanes.lock().remove(pane_id);
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            processed_requests: self.metrics.processed_requests(),
            failed_requests: self.metrics.failed_requests(),
            timed_out_requests: self.metrics.timed_out_requests(),
            queue_length: self.metrics.queue_length(),
            average_latency_ms: self.metrics.average_latency_ms(),
            bound_sessions: self.sessions.read().len(),
        }
    }

    pub fn command_metrics(&self) -> HashMap<String, CommandMetrics> {
        self.metrics.command_metrics()
    }

    fn lane(&self, pane_id: &str) -> Arc<AsyncMutex<()>> {
        self.lanes
            .lock()
            .entry(pane_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn bound(&self, pane_id: &str) -> Result<String, IpcResponse> {
        self.session_id(pane_id).ok_or_else(|| {
            IpcResponse::error(pane_id, "no session bound to pane", IpcErrorKind::UnknownPane)
        })
    }

    fn failure(&self, pane_id: &str, err: PanekeeperError) -> IpcResponse {
        let kind = match &err {
            PanekeeperError::NotFound(_) => {
                self.sessions.write().remove(pane_id);
                IpcErrorKind::SessionLost
            }
            PanekeeperError::Ipc(_) => IpcErrorKind::Disconnected,
            _ => IpcErrorKind::Delivery,
        };
        IpcResponse::error(pane_id, err.to_string(), kind)
    }

    async fn probe(&self, pane_id: &str) -> Result<ProcessProbe, IpcResponse> {
        let session_id = self.bound(pane_id)?;
        let probe = self
            .transport
            .probe(&session_id)
            .await
            .map_err(|e| self.failure(pane_id, e))?;

        if !probe.alive {
            let message = match probe.exit_code {
                Some(code) => format!("process exited with code {}", code),
                None => "process exited".to_string(),
            };
            return Err(IpcResponse::error(pane_id, message, IpcErrorKind::ProcessExited));
        }
        Ok(probe)
    }

    async fn health_status(&self, pane_id: String) -> IpcResponse {
        match self.probe(&pane_id).await {
            Ok(probe) => IpcResponse::HealthStatus {
                pane_id,
                metrics: Box::new(HealthMetrics::sample(
                    probe.uptime_secs,
                    probe.memory_mb,
                    probe.cpu_percent,
                )),
            },
            Err(response) => response,
        }
    }

    async fn dispatch(&self, cmd: IpcCommand) -> IpcResponse {
        match cmd {
            IpcCommand::StartSession {
                pane_id,
                working_directory,
            } => {
                if let Some(existing) = self.session_id(&pane_id) {
                    return IpcResponse::error(
                        &pane_id,
                        format!("session {} already active", existing),
                        IpcErrorKind::Delivery,
                    );
                }
                match self.transport.spawn(Path::new(&working_directory)).await {
                    Ok(session_id) => {
                        self.sessions
                            .write()
                            .insert(pane_id.clone(), session_id.clone());
                        info!("Session {} bound to pane {}", session_id, pane_id);
                        IpcResponse::SessionStarted {
                            pane_id,
                            session_id,
                        }
                    }
                    Err(e) => IpcResponse::error(&pane_id, e.to_string(), IpcErrorKind::Delivery),
                }
            }

            IpcCommand::StopSession { pane_id } => {
                let Some(session_id) = self.sessions.write().remove(&pane_id) else {
                    return IpcResponse::error(
                        &pane_id,
                        "no session bound to pane",
                        IpcErrorKind::UnknownPane,
                    );
                };
                match self.transport.terminate(&session_id).await {
                    Ok(()) | Err(PanekeeperError::NotFound(_)) => {
                        info!("Session {} of pane {} stopped", session_id, pane_id);
                        IpcResponse::SessionStopped { pane_id }
                    }
                    Err(e) => IpcResponse::error(&pane_id, e.to_string(), IpcErrorKind::Delivery),
                }
            }

            IpcCommand::SendInput { pane_id, text } => {
                let session_id = match self.bound(&pane_id) {
                    Ok(id) => id,
                    Err(response) => return response,
                };
                match self.transport.write(&session_id, text.as_bytes()).await {
                    Ok(()) => IpcResponse::InputReceived { pane_id },
                    Err(e) => self.failure(&pane_id, e),
                }
            }

            IpcCommand::ReceiveOutput { pane_id, text } => {
                // No subscribers is fine; output is only relayed, never stored.
                let _ = self.output_tx.send(OutputEvent {
                    pane_id: pane_id.clone(),
                    text: text.clone(),
                    at: Utc::now(),
                });
                IpcResponse::OutputSent { pane_id, text }
            }

            IpcCommand::Heartbeat { pane_id, timestamp } => match self.probe(&pane_id).await {
                Ok(_) => IpcResponse::HeartbeatAck { pane_id, timestamp },
                Err(response) => response,
            },

            IpcCommand::HealthCheck { pane_id } => self.health_status(pane_id).await,

            IpcCommand::ProcessCrashed { pane_id, exit_code } => {
                warn!("Pane {} reported crashed (exit code {:?})", pane_id, exit_code);
                let session = self.sessions.write().remove(&pane_id);
                if let Some(session_id) = session {
                    if let Err(e) = self.transport.terminate(&session_id).await {
                        debug!("Cleanup of crashed session {} failed: {}", session_id, e);
                    }
                }
                IpcResponse::SessionStopped { pane_id }
            }

            IpcCommand::ResourceAlert {
                pane_id,
                resource_name,
                value,
            } => {
                warn!("Resource alert for pane {}: {} = {:.1}", pane_id, resource_name, value);
                self.health_status(pane_id).await
            }
        }
    }
}
