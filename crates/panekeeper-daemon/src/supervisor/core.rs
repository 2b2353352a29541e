use chrono::Utc;
use panekeeper_types::{
    ErrorCategory, HealthMetrics, IpcCommand, IpcErrorKind, IpcResponse, PanekeeperError,
    PanekeeperResult, ProcessError, RecoveryStrategy, WorkerStatus,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cancellation::CancellationSource;
use super::monitor::{CheckResult, HealthMonitor};
use super::recovery::RecoveryPolicy;
use super::registry::WorkerRegistry;
use super::stats::SupervisorStats;
use super::worker::{WorkerProcess, WorkerSummary};
use crate::config::{DaemonConfig, SupervisorConfig};
use crate::ipc::{IpcChannel, OutputEvent};
use crate::metrics::{
    merge_sample, sync_counters, CpuUsageStats, ErrorStatistics, MetricsCollector,
    ResponseTimeStats, StatsResult,
};
use crate::persistence::{JsonFileStore, SessionSnapshot, SessionStore};
use crate::session::{ProcessTransport, SessionRead, SessionTransport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RestartKind {
    Recovery,
    Preventive,
}

enum Launched {
    Bound(String),
    Superseded(WorkerStatus),
}

enum RestartGate {
    Proceed(Option<String>),
    Stale,
    Reschedule,
}

enum Recovery {
    Hold(String),
    Restart {
        strategy: RecoveryStrategy,
        delay: Duration,
        generation: u64,
        attempt: u32,
    },
}

struct SupervisorInner {
    config: SupervisorConfig,
    registry: Arc<WorkerRegistry>,
    channel: Arc<IpcChannel>,
    collector: MetricsCollector,
    policy: RecoveryPolicy,
    store: Option<Arc<dyn SessionStore>>,
    cancel: CancellationSource,
    shutdown: AtomicBool,
    monitor: Mutex<Option<JoinHandle<()>>>,
    pumps: Mutex<HashMap<String, JoinHandle<()>>>,
    total_started: AtomicU64,
    total_restarts: AtomicU64,
    preventive_restarts: AtomicU64,
    started_at: Instant,
}

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        transport: Arc<dyn SessionTransport>,
        store: Option<Arc<dyn SessionStore>>,
    ) -> Self {
        let registry = Arc::new(WorkerRegistry::new());
        let channel = Arc::new(IpcChannel::new(transport, config.health_check_timeout()));
        let store = if config.session_persistence_enabled {
            store
        } else {
            None
        };

        Self {
            inner: Arc::new(SupervisorInner {
                collector: MetricsCollector::new(registry.clone()),
                policy: RecoveryPolicy::from_config(&config),
                config,
                registry,
                channel,
                store,
                cancel: CancellationSource::new(),
                shutdown: AtomicBool::new(false),
                monitor: Mutex::new(None),
                pumps: Mutex::new(HashMap::new()),
                total_started: AtomicU64::new(0),
                total_restarts: AtomicU64::new(0),
                preventive_restarts: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &DaemonConfig) -> Self {
        let transport = Arc::new(ProcessTransport::new(config.session.clone()));
        let store: Option<Arc<dyn SessionStore>> = if config.supervisor.session_persistence_enabled {
            Some(Arc::new(JsonFileStore::new(config.sessions_dir())))
        } else {
            None
        };
        Self::new(config.supervisor.clone(), transport, store)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.inner.registry
    }

    pub fn channel(&self) -> &Arc<IpcChannel> {
        &self.inner.channel
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.inner.collector
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.inner.policy
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<OutputEvent> {
        self.inner.channel.subscribe_output()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    pub fn start(&self) -> PanekeeperResult<()> {
        if self.is_shutting_down() {
            return Err(PanekeeperError::Internal("supervisor is shut down".into()));
        }

        let mut monitor = self.inner.monitor.lock();
        if monitor.is_some() {
            return Err(PanekeeperError::AlreadyExists("health monitor".into()));
        }

        let health = HealthMonitor::new(self.clone());
        *monitor = Some(tokio::spawn(health.run(self.inner.cancel.token())));

        info!(
            "Supervisor started (heartbeat {}ms, timeout {}ms, max restarts {})",
            self.inner.config.heartbeat_interval_ms,
            self.inner.config.health_check_timeout_ms,
            self.inner.config.max_restarts
        );
        Ok(())
    }

    pub async fn start_worker(&self, pane_id: &str, working_directory: impl AsRef<Path>) -> bool {
        if self.is_shutting_down() {
            warn!("Refusing to start worker {} during shutdown", pane_id);
            return false;
        }

        let worker = WorkerProcess::new(
            pane_id,
            working_directory,
            self.inner.config.cpu_history_size,
            self.inner.config.response_history_size,
        );
        if let Err(e) = self.inner.registry.insert(worker) {
            warn!("Cannot start worker {}: {}", pane_id, e);
            return false;
        }
        self.inner.total_started.fetch_add(1, Ordering::Relaxed);

        match self.launch(pane_id).await {
            Ok(Launched::Bound(session_id)) => {
                info!("Worker {} starting (session {})", pane_id, session_id);
                self.schedule_check(pane_id);
                true
            }
            Ok(Launched::Superseded(status)) => status != WorkerStatus::Stopping,
            Err(e) => {
                warn!("Worker {} failed to start: {}", pane_id, e);
                self.inner.registry.remove(pane_id);
                self.inner.channel.release(pane_id);
                false
            }
        }
    }

    pub async fn stop_worker(&self, pane_id: &str) -> bool {
        let moved = self.inner.registry.update(pane_id, |w| {
            if w.status == WorkerStatus::Stopping {
                return None;
            }
            match w.transition(WorkerStatus::Stopping) {
                Ok(()) => Some(w.session_id.clone()),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            }
        });

        let session_id = match moved {
            None => {
                debug!("stop_worker: {} not found", pane_id);
                return false;
            }
            Some(None) => return false,
            Some(Some(session_id)) => session_id,
        };

        if let Some(pump) = self.inner.pumps.lock().remove(pane_id) {
            pump.abort();
        }
        if let Some(session_id) = &session_id {
            self.save_snapshot(pane_id, session_id).await;
        }

        let stop = IpcCommand::StopSession {
            pane_id: pane_id.to_string(),
        };
        match self.inner.channel.send(stop).await {
            Some(IpcResponse::SessionStopped { .. }) => {}
            Some(response) => debug!("Stopping {}: {:?}", pane_id, response),
            None => warn!("Session of {} did not confirm termination in time", pane_id),
        }

        self.inner.registry.remove(pane_id);
        self.inner.channel.release(pane_id);
        info!("Worker {} stopped", pane_id);
        true
    }

    pub fn get_worker_status(&self, pane_id: &str) -> Option<WorkerProcess> {
        self.inner.registry.get(pane_id)
    }

    pub fn get_worker_metrics(&self, pane_id: &str) -> Option<HealthMetrics> {
        self.inner.registry.read(pane_id, |w| w.health.clone())
    }

    pub fn get_cpu_usage_stats(&self, pane_id: &str) -> StatsResult<CpuUsageStats> {
        self.inner.collector.get_cpu_usage_stats(pane_id)
    }

    pub fn get_response_time_stats(&self, pane_id: &str) -> StatsResult<ResponseTimeStats> {
        self.inner.collector.get_response_time_stats(pane_id)
    }

    pub fn get_error_statistics(&self, pane_id: &str) -> StatsResult<ErrorStatistics> {
        self.inner.collector.get_error_statistics(pane_id)
    }

    pub fn list_workers(&self) -> Vec<WorkerSummary> {
        self.inner
            .registry
            .snapshot()
            .iter()
            .map(WorkerProcess::summary)
            .collect()
    }

    pub async fn send_ipc_command(&self, cmd: IpcCommand) -> Option<IpcResponse> {
        let notice = match &cmd {
            IpcCommand::ProcessCrashed { .. } | IpcCommand::ResourceAlert { .. } => Some(cmd.clone()),
            _ => None,
        };

        let response = self.inner.channel.send(cmd).await;
        if let Some(response) = &response {
            self.observe(response);
        }

        match notice {
            Some(IpcCommand::ProcessCrashed { pane_id, exit_code }) => {
                self.report_process_crashed(&pane_id, exit_code);
            }
            Some(IpcCommand::ResourceAlert {
                pane_id,
                resource_name,
                value,
            }) => {
                self.report_resource_alert(&pane_id, &resource_name, value);
            }
            _ => {}
        }

        response
    }

    pub async fn send_ipc_command_with_metrics(
        &self,
        pane_id: &str,
        cmd: IpcCommand,
    ) -> Option<IpcResponse> {
        let request_id = Uuid::new_v4().to_string();
        let tracked = self
            .inner
            .registry
            .update(pane_id, |w| w.response_times.start_measurement(&request_id))
            .is_some();
        if !tracked {
            return Some(IpcResponse::error(
                pane_id,
                "unknown worker",
                IpcErrorKind::UnknownPane,
            ));
        }

        let response = self.send_ipc_command(cmd).await;

        self.inner.registry.update(pane_id, |w| {
            match &response {
                Some(r) => {
                    w.response_times.complete_measurement(&request_id);
                    if r.is_error() {
                        w.errors.increment(ErrorCategory::Ipc);
                    }
                }
                None => {
                    w.response_times.abandon_measurement(&request_id);
                    w.errors.increment(ErrorCategory::Timeout);
                }
            }
            sync_counters(w);
        });

        response
    }

    pub async fn heartbeat(&self, pane_id: &str) -> bool {
        matches!(
            self.send_ipc_command_with_metrics(pane_id, IpcCommand::heartbeat(pane_id))
                .await,
            Some(IpcResponse::HeartbeatAck { .. })
        )
    }

    pub async fn send_input(&self, pane_id: &str, text: &str) -> bool {
        let cmd = IpcCommand::SendInput {
            pane_id: pane_id.to_string(),
            text: text.to_string(),
        };
        matches!(
            self.send_ipc_command_with_metrics(pane_id, cmd).await,
            Some(IpcResponse::InputReceived { .. })
        )
    }

    pub fn report_process_crashed(&self, pane_id: &str, exit_code: Option<i32>) -> bool {
        let error = self
            .inner
            .registry
            .read(pane_id, |w| {
                if !w.status.is_live() {
                    return None;
                }
                Some(if w.status == WorkerStatus::Starting {
                    ProcessError::StartupFailure {
                        reason: match exit_code {
                            Some(code) => format!("exited during startup with code {}", code),
                            None => "exited during startup".to_string(),
                        },
                    }
                } else {
                    ProcessError::CommunicationFailure {
                        last_known_state: w.status,
                    }
                })
            })
            .flatten();

        match error {
            Some(error) => {
                self.handle_crash(pane_id, error);
                true
            }
            None => false,
        }
    }

    pub fn report_resource_alert(&self, pane_id: &str, resource_name: &str, value: f64) -> bool {
        if !self.inner.registry.contains(pane_id) {
            return false;
        }

        let limit = match resource_name.to_ascii_lowercase().as_str() {
            "memory" => Some(self.inner.config.memory_limit_mb),
            "cpu" => Some(self.inner.config.cpu_limit_percent),
            _ => None,
        };
        if let Some(limit) = limit {
            if value <= limit {
                debug!("Resource alert for {} within limit: {} = {:.1}", pane_id, resource_name, value);
                return true;
            }
        }

        warn!("Worker {} over limit: {} = {:.1}", pane_id, resource_name, value);
        self.inner.registry.update(pane_id, |w| {
            w.errors.increment(ErrorCategory::Other);
            sync_counters(w);
        });
        HealthMonitor::new(self.clone()).apply(pane_id, CheckResult::OverLimit(resource_name.to_string()));
        true
    }

    pub fn clear_restart_count(&self, pane_id: &str) -> bool {
        let resume = self.inner.registry.update(pane_id, |w| {
            w.restart_count = 0;
            w.health.restart_count = 0;
            let was_held = w.manual_intervention.take().is_some();
            was_held && w.status == WorkerStatus::Crashed
        });

        match resume {
            None => false,
            Some(resume) => {
                info!("Restart count of worker {} cleared", pane_id);
                if resume {
                    self.recover(pane_id);
                }
                true
            }
        }
    }

    pub fn stats(&self) -> SupervisorStats {
        let workers = self.inner.registry.snapshot();
        let count = |status: WorkerStatus| workers.iter().filter(|w| w.status == status).count();

        SupervisorStats {
            total_workers: workers.len(),
            starting: count(WorkerStatus::Starting),
            running: count(WorkerStatus::Running),
            unhealthy: count(WorkerStatus::Unhealthy),
            crashed: count(WorkerStatus::Crashed),
            stopping: count(WorkerStatus::Stopping),
            total_started: self.inner.total_started.load(Ordering::Relaxed),
            total_restarts: self.inner.total_restarts.load(Ordering::Relaxed),
            preventive_restarts: self.inner.preventive_restarts.load(Ordering::Relaxed),
            manual_intervention: workers.iter().filter(|w| w.is_held()).count(),
            uptime_secs: self.inner.started_at.elapsed().as_secs(),
            ipc: self.inner.channel.stats(),
            fleet: self.inner.collector.fleet_summary(),
        }
    }

    pub async fn shutdown(&self, timeout: Duration) -> PanekeeperResult<()> {
        if self.inner.shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Initiating supervisor shutdown with {:?} timeout", timeout);
        self.inner.cancel.cancel();
        let deadline = Instant::now() + timeout;

        let monitor = self.inner.monitor.lock().take();
        if let Some(handle) = monitor {
            let abort = handle.abort_handle();
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, handle).await {
                Ok(Ok(())) => debug!("Health monitor stopped"),
                Ok(Err(e)) => warn!("Health monitor task failed: {}", e),
                Err(_) => {
                    warn!("Health monitor did not stop in time, aborting");
                    abort.abort();
                }
            }
        }

        let panes = self.inner.registry.pane_ids();
        let remaining = deadline.saturating_duration_since(Instant::now());
        let stops = futures::future::join_all(panes.iter().map(|pane| self.stop_worker(pane)));
        if tokio::time::timeout(remaining, stops).await.is_err() {
            warn!("Shutdown timeout reached, releasing remaining workers");
        }

        for (_, pump) in self.inner.pumps.lock().drain() {
            pump.abort();
        }
        for pane in self.inner.registry.pane_ids() {
            self.inner.registry.remove(&pane);
            self.inner.channel.release(&pane);
        }

        info!("Supervisor shutdown complete");
        Ok(())
    }

    pub(crate) fn handle_crash(&self, pane_id: &str, error: ProcessError) {
        let crashed = self
            .inner
            .registry
            .update(pane_id, |w| {
                if matches!(w.status, WorkerStatus::Crashed | WorkerStatus::Stopping) {
                    return false;
                }
                if let Err(e) = w.transition(WorkerStatus::Crashed) {
                    warn!("{}", e);
                    return false;
                }
                w.errors.increment(ErrorCategory::Crash);
                w.last_error = Some(error.clone());
                w.consecutive_failures = 0;
                sync_counters(w);
                true
            })
            .unwrap_or(false);

        if crashed {
            warn!("Worker {} crashed: {}", pane_id, error);
            self.recover(pane_id);
        }
    }

    fn recover(&self, pane_id: &str) {
        let policy = &self.inner.policy;
        let decision = self
            .inner
            .registry
            .update(pane_id, |w| {
                if w.status != WorkerStatus::Crashed || w.restart_pending || w.is_held() {
                    return None;
                }
                let error = w.last_error.clone().unwrap_or(ProcessError::CommunicationFailure {
                    last_known_state: WorkerStatus::Crashed,
                });
                let strategy = policy.select(&error, w.restart_count);
                w.last_strategy = Some(strategy.clone());

                if let RecoveryStrategy::ManualIntervention { reason } = &strategy {
                    w.manual_intervention = Some(reason.clone());
                    return Some(Recovery::Hold(reason.clone()));
                }

                let delay = policy.restart_delay(&strategy, w.last_restart_at.map(|t| t.elapsed()));
                w.restart_count += 1;
                w.restart_pending = true;
                sync_counters(w);
                Some(Recovery::Restart {
                    strategy,
                    delay,
                    generation: w.generation,
                    attempt: w.restart_count,
                })
            })
            .flatten();

        match decision {
            None => {}
            Some(Recovery::Hold(reason)) => {
                warn!("Worker {} requires manual intervention: {}", pane_id, reason);
            }
            Some(Recovery::Restart {
                strategy,
                delay,
                generation,
                attempt,
            }) => {
                self.inner.total_restarts.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Worker {}: {} (attempt {}, starting in {:?})",
                    pane_id, strategy, attempt, delay
                );

                let supervisor = self.clone();
                let pane_id = pane_id.to_string();
                let mut cancel = self.inner.cancel.token();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            supervisor.restart_session(&pane_id, generation, RestartKind::Recovery).await;
                        }
                        _ = cancel.cancelled() => {
                            debug!("Restart of {} cancelled by shutdown", pane_id);
                        }
                    }
                });
            }
        }
    }

    pub(crate) async fn preventive_restart(&self, pane_id: &str, generation: u64) {
        self.restart_session(pane_id, generation, RestartKind::Preventive)
            .await;
    }

    async fn restart_session(&self, pane_id: &str, generation: u64, kind: RestartKind) {
        let expected = match kind {
            RestartKind::Recovery => WorkerStatus::Crashed,
            RestartKind::Preventive => WorkerStatus::Running,
        };

        let gate = self
            .inner
            .registry
            .update(pane_id, |w| {
                if w.generation != generation || w.status != expected {
                    if kind == RestartKind::Preventive {
                        return RestartGate::Stale;
                    }
                    w.restart_pending = false;
                    return if w.status == WorkerStatus::Crashed {
                        RestartGate::Reschedule
                    } else {
                        RestartGate::Stale
                    };
                }
                if let Err(e) = w.transition(WorkerStatus::Starting) {
                    warn!("{}", e);
                    return RestartGate::Stale;
                }
                w.restart_pending = false;
                w.last_restart_at = Some(Instant::now());
                if kind == RestartKind::Preventive {
                    w.preventive_restarts += 1;
                }
                RestartGate::Proceed(w.session_id.take())
            })
            .unwrap_or(RestartGate::Stale);

        let previous_session = match gate {
            RestartGate::Proceed(previous) => previous,
            RestartGate::Stale => {
                debug!("Skipping stale restart of {}", pane_id);
                return;
            }
            RestartGate::Reschedule => {
                debug!("Restart of {} outdated, re-evaluating recovery", pane_id);
                self.recover(pane_id);
                return;
            }
        };

        if kind == RestartKind::Preventive {
            self.inner.preventive_restarts.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(pump) = self.inner.pumps.lock().remove(pane_id) {
            pump.abort();
        }
        if let Some(session_id) = &previous_session {
            self.save_snapshot(pane_id, session_id).await;
        }

        let stop = IpcCommand::StopSession {
            pane_id: pane_id.to_string(),
        };
        if let Some(response) = self.inner.channel.send(stop).await {
            if response.is_error() {
                debug!("Old session of {} already gone: {:?}", pane_id, response);
            }
        }

        match self.launch(pane_id).await {
            Ok(Launched::Bound(session_id)) => {
                info!("Worker {} restarted with session {}", pane_id, session_id);
                self.schedule_check(pane_id);
            }
            Ok(Launched::Superseded(status)) => {
                debug!("Restart of {} superseded, worker is {}", pane_id, status);
            }
            Err(e) => {
                self.handle_crash(
                    pane_id,
                    ProcessError::StartupFailure {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    async fn launch(&self, pane_id: &str) -> PanekeeperResult<Launched> {
        let working_directory = self
            .inner
            .registry
            .read(pane_id, |w| w.working_directory.clone())
            .ok_or_else(|| PanekeeperError::NotFound(format!("worker '{}'", pane_id)))?;

        let start = IpcCommand::StartSession {
            pane_id: pane_id.to_string(),
            working_directory: working_directory.to_string_lossy().into_owned(),
        };
        let session_id = match self.inner.channel.send(start).await {
            Some(IpcResponse::SessionStarted { session_id, .. }) => session_id,
            Some(IpcResponse::Error { message, .. }) => {
                return Err(PanekeeperError::Session(message))
            }
            Some(other) => {
                return Err(PanekeeperError::Ipc(format!("unexpected response {:?}", other)))
            }
            None => {
                return Err(PanekeeperError::Timeout(
                    self.inner.config.health_check_timeout_ms,
                ))
            }
        };

        let process_id = self.inner.channel.process_id(pane_id).await;
        let resumed_from = self.load_snapshot(pane_id).await;
        let history = self.inner.config.cpu_history_size;

        if self.inner.channel.session_id(pane_id).as_deref() != Some(session_id.as_str()) {
            let status = self
                .inner
                .registry
                .read(pane_id, |w| w.status)
                .unwrap_or(WorkerStatus::Stopping);
            debug!("Session {} of {} was replaced during launch", session_id, pane_id);
            return Ok(Launched::Superseded(status));
        }

        let bound = self
            .inner
            .registry
            .update(pane_id, |w| {
                if w.status != WorkerStatus::Starting {
                    return Err(w.status);
                }
                w.session_id = Some(session_id.clone());
                w.process_id = process_id;
                w.start_time = Utc::now();
                w.launched_at = Instant::now();
                w.last_heartbeat = None;
                w.consecutive_failures = 0;
                w.generation += 1;
                w.health = HealthMetrics::new(history);
                if resumed_from.is_some() {
                    w.resumed_from = resumed_from.clone();
                }
                sync_counters(w);
                Ok(())
            })
            .unwrap_or(Err(WorkerStatus::Stopping));

        if let Err(status) = bound {
            info!(
                "Worker {} became {} during launch, dropping session {}",
                pane_id, status, session_id
            );
            let stop = IpcCommand::StopSession {
                pane_id: pane_id.to_string(),
            };
            self.inner.channel.send(stop).await;
            return Ok(Launched::Superseded(status));
        }

        self.spawn_output_pump(pane_id, &session_id);
        Ok(Launched::Bound(session_id))
    }

    fn schedule_check(&self, pane_id: &str) {
        let monitor = HealthMonitor::new(self.clone());
        let pane_id = pane_id.to_string();
        tokio::spawn(async move { monitor.check_worker(&pane_id).await });
    }

    fn observe(&self, response: &IpcResponse) {
        let now = Utc::now();
        let pane_id = response.pane_id();
        match response {
            IpcResponse::HealthStatus { metrics, .. } => {
                self.inner.registry.update(pane_id, |w| {
                    merge_sample(w, metrics);
                    w.last_heartbeat = Some(now);
                });
            }
            IpcResponse::HeartbeatAck { .. } => {
                self.inner.registry.update(pane_id, |w| {
                    w.last_heartbeat = Some(now);
                    w.health.last_activity = now;
                });
            }
            IpcResponse::InputReceived { .. } | IpcResponse::OutputSent { .. } => {
                self.inner.registry.update(pane_id, |w| w.health.last_activity = now);
            }
            _ => {}
        }
    }

    fn spawn_output_pump(&self, pane_id: &str, session_id: &str) {
        let supervisor = self.clone();
        let pane = pane_id.to_string();
        let session = session_id.to_string();
        let handle = tokio::spawn(async move { supervisor.pump_output(pane, session).await });

        if let Some(old) = self.inner.pumps.lock().insert(pane_id.to_string(), handle) {
            old.abort();
        }
    }

    async fn pump_output(self, pane_id: String, session_id: String) {
        loop {
            match self.inner.channel.read_output(&session_id).await {
                Ok(SessionRead::Data(bytes)) => {
                    let cmd = IpcCommand::ReceiveOutput {
                        pane_id: pane_id.clone(),
                        text: String::from_utf8_lossy(&bytes).into_owned(),
                    };
                    if let Some(response) = self.inner.channel.send(cmd).await {
                        self.observe(&response);
                    }
                }
                Ok(SessionRead::Eof) => {
                    // Only the live worker's own session counts as a crash.
                    let current = self
                        .inner
                        .registry
                        .read(&pane_id, |w| {
                            w.status.is_live() && w.session_id.as_deref() == Some(session_id.as_str())
                        })
                        .unwrap_or(false);
                    if current {
                        info!("Session {} of worker {} closed its output", session_id, pane_id);
                        self.report_process_crashed(&pane_id, None);
                    }
                    break;
                }
                Err(e) => {
                    debug!("Output pump of {} stopped: {}", pane_id, e);
                    break;
                }
            }
        }
    }

    async fn save_snapshot(&self, pane_id: &str, session_id: &str) {
        let Some(store) = &self.inner.store else {
            return;
        };
        let Some(snapshot) = self.inner.registry.read(pane_id, |w| SessionSnapshot {
            pane_id: pane_id.to_string(),
            session_id: session_id.to_string(),
            working_directory: w.working_directory.clone(),
            restart_count: w.restart_count,
            saved_at: Utc::now(),
        }) else {
            return;
        };

        if let Err(e) = store.save(pane_id, &snapshot).await {
            warn!("Failed to save session snapshot of {}: {}", pane_id, e);
        }
    }

    async fn load_snapshot(&self, pane_id: &str) -> Option<String> {
        let store = self.inner.store.as_ref()?;
        match store.load(pane_id).await {
            Ok(Some(snapshot)) => {
                info!("Worker {} resuming from session {}", pane_id, snapshot.session_id);
                Some(snapshot.session_id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load session snapshot of {}: {}", pane_id, e);
                None
            }
        }
    }
}
