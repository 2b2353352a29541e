use chrono::Utc;
use panekeeper_types::{IpcCommand, IpcErrorKind, IpcResponse, ProcessError, WorkerStatus};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::cancellation::CancellationToken;
use super::core::Supervisor;

#[derive(Clone, Debug, PartialEq)]
pub enum CheckResult {
    Healthy,
    /// The probe answered but a resource is over its limit.
    OverLimit(String),
    Failed { error: ProcessError, fatal: bool },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    Unchanged,
    Transition(WorkerStatus),
    Crash(ProcessError),
}

#[derive(Clone, Debug)]
pub struct CheckContext {
    pub status: WorkerStatus,
    pub consecutive_failures: u32,
    pub time_in_status: Duration,
    pub startup_deadline: Duration,
    pub max_failures: u32,
}

/// Next state of a worker after a check, plus its new consecutive failure
/// count. Over-limit answers count as failures.
pub fn evaluate_check(ctx: &CheckContext, result: &CheckResult) -> (Verdict, u32) {
    use WorkerStatus::*;

    let failures = ctx.consecutive_failures.saturating_add(1);
    match (ctx.status, result) {
        (Crashed | Stopping, _) => (Verdict::Unchanged, ctx.consecutive_failures),

        (Starting, CheckResult::Healthy | CheckResult::OverLimit(_)) => {
            (Verdict::Transition(Running), 0)
        }
        (Starting, CheckResult::Failed { error, fatal: true }) => (Verdict::Crash(error.clone()), 0),
        (Starting, CheckResult::Failed { .. }) if ctx.time_in_status >= ctx.startup_deadline => (
            Verdict::Crash(ProcessError::StartupFailure {
                reason: format!(
                    "no health response within {}ms",
                    ctx.startup_deadline.as_millis()
                ),
            }),
            0,
        ),
        (Starting, CheckResult::Failed { .. }) => (Verdict::Unchanged, failures),

        (Running, CheckResult::Healthy) => (Verdict::Unchanged, 0),
        (Unhealthy, CheckResult::Healthy) => (Verdict::Transition(Running), 0),

        (Running | Unhealthy, CheckResult::Failed { error, fatal: true }) => {
            (Verdict::Crash(error.clone()), 0)
        }
        (Running, _) => (Verdict::Transition(Unhealthy), failures),

        (Unhealthy, _) if failures < ctx.max_failures => (Verdict::Unchanged, failures),
        (Unhealthy, CheckResult::OverLimit(resource)) => (
            Verdict::Crash(ProcessError::ResourceExhaustion {
                resource_name: resource.clone(),
            }),
            0,
        ),
        (Unhealthy, CheckResult::Failed { error, .. }) => (Verdict::Crash(error.clone()), 0),
    }
}

pub fn error_for(
    kind: IpcErrorKind,
    message: &str,
    status: WorkerStatus,
    session_id: Option<&str>,
) -> ProcessError {
    match kind {
        IpcErrorKind::Disconnected => ProcessError::NetworkConnectivityLoss,
        IpcErrorKind::SessionLost => ProcessError::CorruptedSession {
            session_id: session_id.unwrap_or_default().to_string(),
        },
        IpcErrorKind::ProcessExited if status == WorkerStatus::Starting => {
            ProcessError::StartupFailure {
                reason: message.to_string(),
            }
        }
        IpcErrorKind::ProcessExited | IpcErrorKind::Delivery | IpcErrorKind::UnknownPane => {
            ProcessError::CommunicationFailure {
                last_known_state: status,
            }
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[derive(Clone)]
pub struct HealthMonitor {
    supervisor: Supervisor,
}

impl HealthMonitor {
    pub fn new(supervisor: Supervisor) -> Self {
        Self { supervisor }
    }

    pub async fn run(self, mut cancel: CancellationToken) {
        let config = self.supervisor.config().clone();

        let mut heartbeat = tokio::time::interval(config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut preventive = config.preventive_restart_interval().map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        info!(
            "Health monitor running (every {:?}, preventive restarts {})",
            config.heartbeat_interval(),
            match config.preventive_restart_interval() {
                Some(period) => format!("every {:?}", period),
                None => "off".to_string(),
            }
        );

        loop {
            tokio::select! {
                _ = heartbeat.tick() => self.tick().await,
                _ = next_tick(&mut preventive) => self.preventive_sweep(),
                _ = cancel.cancelled() => break,
            }
        }

        debug!("Health monitor loop ended");
    }

    pub async fn tick(&self) {
        let handles: Vec<_> = self
            .supervisor
            .registry()
            .pane_ids()
            .into_iter()
            .map(|pane_id| {
                let monitor = self.clone();
                tokio::spawn(async move { monitor.check_worker(&pane_id).await })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Health check task failed: {}", e);
            }
        }
    }

    pub async fn check_worker(&self, pane_id: &str) {
        let Some((status, skip)) = self
            .supervisor
            .registry()
            .read(pane_id, |w| (w.status, w.restart_pending || w.is_held()))
        else {
            return;
        };
        if !status.is_live() || skip {
            trace!("Skipping health check of {} ({})", pane_id, status);
            return;
        }

        let response = self
            .supervisor
            .send_ipc_command_with_metrics(pane_id, IpcCommand::health_check(pane_id))
            .await;
        let result = self.classify(pane_id, status, response);
        trace!("Health check of {}: {:?}", pane_id, result);
        self.apply(pane_id, result);
    }

    fn classify(
        &self,
        pane_id: &str,
        status: WorkerStatus,
        response: Option<IpcResponse>,
    ) -> CheckResult {
        let config = self.supervisor.config();
        match response {
            Some(IpcResponse::HealthStatus { metrics, .. }) => {
                match metrics.exceeds(config.memory_limit_mb, config.cpu_limit_percent) {
                    Some(resource) => CheckResult::OverLimit(resource.to_string()),
                    None => CheckResult::Healthy,
                }
            }
            Some(IpcResponse::Error { kind, message, .. }) => {
                let session_id = self
                    .supervisor
                    .registry()
                    .read(pane_id, |w| w.session_id.clone())
                    .flatten();
                CheckResult::Failed {
                    error: error_for(kind, &message, status, session_id.as_deref()),
                    fatal: kind.is_fatal(),
                }
            }
            Some(other) => {
                debug!("Unexpected health response from {}: {:?}", pane_id, other);
                CheckResult::Failed {
                    error: ProcessError::CommunicationFailure {
                        last_known_state: status,
                    },
                    fatal: false,
                }
            }
            None => {
                let unresponsive_ms = self
                    .supervisor
                    .registry()
                    .read(pane_id, |w| match w.last_heartbeat {
                        Some(at) => (Utc::now() - at).num_milliseconds().max(0) as u64,
                        None => w.uptime().as_millis() as u64,
                    })
                    .unwrap_or(0);
                CheckResult::Failed {
                    error: ProcessError::UnresponsiveProcess { unresponsive_ms },
                    fatal: false,
                }
            }
        }
    }

    pub fn apply(&self, pane_id: &str, result: CheckResult) {
        let config = self.supervisor.config();
        let outcome = self.supervisor.registry().update(pane_id, |w| {
            let ctx = CheckContext {
                status: w.status,
                consecutive_failures: w.consecutive_failures,
                time_in_status: w.time_in_status(),
                startup_deadline: config.health_check_timeout(),
                max_failures: config.max_consecutive_failures,
            };
            let previous = w.status;
            let (verdict, failures) = evaluate_check(&ctx, &result);
            w.consecutive_failures = failures;
            if let Verdict::Transition(next) = verdict {
                if let Err(e) = w.transition(next) {
                    warn!("{}", e);
                    return (Verdict::Unchanged, previous);
                }
            }
            (verdict, previous)
        });

        let Some((verdict, previous)) = outcome else {
            return;
        };

        match verdict {
            Verdict::Unchanged => {}
            Verdict::Transition(WorkerStatus::Running) if previous == WorkerStatus::Starting => {
                info!("Worker {} is running", pane_id);
            }
            Verdict::Transition(WorkerStatus::Running) => {
                info!("Worker {} recovered and is running again", pane_id);
            }
            Verdict::Transition(WorkerStatus::Unhealthy) => {
                warn!("Worker {} is unhealthy: {}", pane_id, describe(&result));
            }
            Verdict::Transition(next) => {
                debug!("Worker {} moved to {}", pane_id, next);
            }
            Verdict::Crash(error) => {
                self.supervisor.handle_crash(pane_id, error);
            }
        }
    }

    pub fn preventive_sweep(&self) {
        let Some(interval) = self.supervisor.config().preventive_restart_interval() else {
            return;
        };

        let due: Vec<(String, u64)> = self
            .supervisor
            .registry()
            .snapshot()
            .into_iter()
            .filter(|w| {
                w.status == WorkerStatus::Running
                    && !w.restart_pending
                    && !w.is_held()
                    && w.uptime() >= interval
            })
            .map(|w| (w.pane_id, w.generation))
            .collect();

        for (pane_id, generation) in due {
            info!("Preventive restart of worker {}", pane_id);
            let supervisor = self.supervisor.clone();
            tokio::spawn(async move {
                supervisor.preventive_restart(&pane_id, generation).await;
            });
        }
    }
}

fn describe(result: &CheckResult) -> String {
    match result {
        CheckResult::Healthy => "healthy".to_string(),
        CheckResult::OverLimit(resource) => format!("{} over limit", resource),
        CheckResult::Failed { error, .. } => error.to_string(),
    }
}
