use super::*;
use crate::config::SupervisorConfig;
use crate::persistence::{JsonFileStore, SessionStore};
use crate::session::scripted::{ProbeMode, ScriptedTransport};
use panekeeper_types::{IpcCommand, ProcessError, RecoveryStrategy, WorkerStatus, MAX_RESTART_LIMIT_REASON};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        heartbeat_interval_ms: 100,
        health_check_timeout_ms: 50,
        restart_delay_ms: 20,
        restart_cooldown_ms: 0,
        max_consecutive_failures: 2,
        cpu_history_size: 8,
        response_history_size: 8,
        ..SupervisorConfig::default()
    }
}

fn supervisor_with(config: SupervisorConfig) -> (Arc<ScriptedTransport>, Supervisor) {
    let transport = Arc::new(ScriptedTransport::new());
    let supervisor = Supervisor::new(config, transport.clone(), None);
    (transport, supervisor)
}

fn supervisor() -> (Arc<ScriptedTransport>, Supervisor) {
    supervisor_with(fast_config())
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn status_of(supervisor: &Supervisor, pane: &str) -> Option<WorkerStatus> {
    supervisor.get_worker_status(pane).map(|w| w.status)
}

async fn running(supervisor: &Supervisor, pane: &str) -> bool {
    wait_for(|| status_of(supervisor, pane) == Some(WorkerStatus::Running)).await
}

#[tokio::test]
async fn test_unknown_pane_queries() {
    let (_, supervisor) = supervisor();

    assert!(supervisor.get_worker_status("ghost").is_none());
    assert!(supervisor.get_worker_metrics("ghost").is_none());
    assert!(!supervisor.get_cpu_usage_stats("ghost").is_available());
    assert!(!supervisor.get_response_time_stats("ghost").is_available());
    assert!(!supervisor.get_error_statistics("ghost").is_available());
    assert!(!supervisor.stop_worker("ghost").await);
    assert!(!supervisor.heartbeat("ghost").await);
    assert!(!supervisor.send_input("ghost", "ls\n").await);
    assert!(!supervisor.report_process_crashed("ghost", Some(1)));
    assert!(!supervisor.report_resource_alert("ghost", "memory", 1e9));
    assert!(!supervisor.clear_restart_count("ghost"));
}

#[tokio::test]
async fn test_start_worker_becomes_running() {
    let (_, supervisor) = supervisor();

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(running(&supervisor, "dev1").await);

    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert!(worker.session_id.is_some());
    assert!(worker.process_id.is_some());
    assert_eq!(worker.restart_count, 0);

    let metrics = supervisor.get_worker_metrics("dev1").unwrap();
    assert_eq!(metrics.memory_usage_mb, 128.0);
    assert!(supervisor.get_cpu_usage_stats("dev1").is_available());
}

#[tokio::test]
async fn test_duplicate_start_refused() {
    let (transport, supervisor) = supervisor();

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(!supervisor.start_worker("dev1", "/work/other").await);
    assert_eq!(transport.spawn_count("/work/other"), 0);
    assert_eq!(transport.live_sessions(), 1);
}

#[tokio::test]
async fn test_spawn_failure_removes_worker() {
    let (transport, supervisor) = supervisor();
    transport.fail_spawns("/work/broken", true);

    assert!(!supervisor.start_worker("dev1", "/work/broken").await);
    assert!(supervisor.get_worker_status("dev1").is_none());
    assert_eq!(transport.spawn_count("/work/broken"), 1);
    assert!(supervisor.channel().session_id("dev1").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers() {
    let (transport, supervisor) = supervisor();
    let panes: Vec<String> = (1..=5).map(|i| format!("dev{}", i)).collect();

    let observer = {
        let supervisor = supervisor.clone();
        let panes = panes.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                for pane in &panes {
                    if let Some(worker) = supervisor.get_worker_status(pane) {
                        assert_eq!(&worker.pane_id, pane);
                    }
                    let _ = supervisor.get_cpu_usage_stats(pane);
                }
                assert!(supervisor.list_workers().len() <= 5);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let lifecycles: Vec<_> = panes
        .iter()
        .cloned()
        .map(|pane| {
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                let dir = format!("/work/{}", pane);
                assert!(supervisor.start_worker(&pane, &dir).await);
                assert!(!supervisor.start_worker(&pane, &dir).await);
                assert!(running(&supervisor, &pane).await, "{} never became running", pane);

                let worker = supervisor.get_worker_status(&pane).unwrap();
                assert_eq!(worker.pane_id, pane);
                assert!(supervisor.get_cpu_usage_stats(&pane).is_available());

                assert!(supervisor.stop_worker(&pane).await);
                assert!(supervisor.get_worker_status(&pane).is_none());
                assert!(!supervisor.get_cpu_usage_stats(&pane).is_available());
            })
        })
        .collect();

    for result in futures::future::join_all(lifecycles).await {
        result.unwrap();
    }
    observer.await.unwrap();

    assert!(supervisor.registry().is_empty());
    assert_eq!(transport.live_sessions(), 0);
    assert_eq!(supervisor.stats().total_started, 5);
    for pane in &panes {
        assert_eq!(transport.spawn_count(format!("/work/{}", pane)), 1);
    }
}

#[tokio::test]
async fn test_hung_worker_is_restarted() {
    let config = SupervisorConfig {
        health_check_timeout_ms: 200,
        ..fast_config()
    };
    let (transport, supervisor) = supervisor_with(config);
    supervisor.start().unwrap();

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(running(&supervisor, "dev1").await);
    let first_session = supervisor.get_worker_status("dev1").unwrap().session_id;

    transport.set_mode("/work/dev1", ProbeMode::Hang);
    assert!(wait_for(|| status_of(&supervisor, "dev1") == Some(WorkerStatus::Unhealthy)).await);
    assert!(
        wait_for(|| supervisor
            .get_worker_status("dev1")
            .map(|w| w.restart_count >= 1)
            .unwrap_or(false))
        .await
    );
    transport.set_mode("/work/dev1", ProbeMode::default());

    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(worker.restart_count, 1);
    assert!(matches!(
        worker.last_error,
        Some(ProcessError::UnresponsiveProcess { .. })
    ));
    assert_eq!(worker.last_strategy, Some(RecoveryStrategy::ImmediateRestart));

    assert!(running(&supervisor, "dev1").await);
    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(worker.restart_count, 1);
    assert_ne!(worker.session_id, first_session);
    assert_eq!(worker.errors.process_crashes(), 1);
    assert!(worker.errors.timeout_errors() >= 2);
    assert_eq!(supervisor.stats().total_restarts, 1);

    supervisor.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_crash_during_launch_is_recovered() {
    let config = SupervisorConfig {
        health_check_timeout_ms: 300,
        restart_delay_ms: 600,
        ..fast_config()
    };
    let (transport, supervisor) = supervisor_with(config);
    // Binding waits on a pid lookup that only gives up at the channel timeout.
    transport.set_mode("/work/race", ProbeMode::Hang);

    let launching = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move { supervisor.start_worker("race", "/work/race").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(status_of(&supervisor, "race"), Some(WorkerStatus::Starting));
    assert!(supervisor.report_process_crashed("race", Some(1)));
    transport.set_mode("/work/race", ProbeMode::default());

    assert!(launching.await.unwrap());
    let worker = supervisor.get_worker_status("race").unwrap();
    assert_eq!(worker.status, WorkerStatus::Crashed);
    assert!(worker.session_id.is_none());
    assert_eq!(transport.live_sessions(), 0);

    assert!(running(&supervisor, "race").await);
    let worker = supervisor.get_worker_status("race").unwrap();
    assert_eq!(worker.restart_count, 1);
    assert!(matches!(worker.last_error, Some(ProcessError::StartupFailure { .. })));
    assert_eq!(transport.spawn_count("/work/race"), 2);
    assert_eq!(transport.live_sessions(), 1);
}

#[tokio::test]
async fn test_lost_connection_restarts_worker() {
    let config = SupervisorConfig {
        restart_delay_ms: 200,
        ..fast_config()
    };
    let (transport, supervisor) = supervisor_with(config);
    supervisor.start().unwrap();

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(running(&supervisor, "dev1").await);

    transport.set_mode("/work/dev1", ProbeMode::Disconnected);
    assert!(
        wait_for(|| supervisor
            .get_worker_status("dev1")
            .map(|w| w.restart_count == 1
                && w.last_error == Some(ProcessError::NetworkConnectivityLoss))
            .unwrap_or(false))
        .await
    );
    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(
        worker.last_strategy,
        Some(RecoveryStrategy::DelayedRestart { delay_ms: 200 })
    );
    assert!(worker.errors.ipc_errors() >= 2);
    transport.set_mode("/work/dev1", ProbeMode::default());

    assert!(running(&supervisor, "dev1").await);
    assert_eq!(transport.spawn_count("/work/dev1"), 2);

    supervisor.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_restart_limit_holds_for_manual_intervention() {
    let (transport, supervisor) = supervisor();
    transport.set_mode("/work/dev1", ProbeMode::Dead(Some(1)));

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(
        wait_for(|| supervisor
            .get_worker_status("dev1")
            .map(|w| w.is_held())
            .unwrap_or(false))
        .await
    );

    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(worker.status, WorkerStatus::Crashed);
    assert_eq!(worker.restart_count, 3);
    assert_eq!(worker.manual_intervention.as_deref(), Some(MAX_RESTART_LIMIT_REASON));
    assert!(matches!(
        worker.last_strategy,
        Some(RecoveryStrategy::ManualIntervention { .. })
    ));
    assert!(matches!(worker.last_error, Some(ProcessError::StartupFailure { .. })));
    assert_eq!(transport.spawn_count("/work/dev1"), 4);
    assert_eq!(supervisor.stats().manual_intervention, 1);

    // Held workers stay put.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(transport.spawn_count("/work/dev1"), 4);

    transport.set_mode("/work/dev1", ProbeMode::default());
    assert!(supervisor.clear_restart_count("dev1"));
    assert!(running(&supervisor, "dev1").await);

    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(worker.restart_count, 1);
    assert!(!worker.is_held());
}

#[tokio::test]
async fn test_reported_crash_triggers_restart() {
    let (_, supervisor) = supervisor();
    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(running(&supervisor, "dev1").await);

    let response = supervisor
        .send_ipc_command(IpcCommand::ProcessCrashed {
            pane_id: "dev1".into(),
            exit_code: Some(9),
        })
        .await;
    assert!(response.is_some());

    assert!(
        wait_for(|| supervisor
            .get_worker_status("dev1")
            .map(|w| w.restart_count == 1 && w.status == WorkerStatus::Running)
            .unwrap_or(false))
        .await
    );
    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(
        worker.last_error,
        Some(ProcessError::CommunicationFailure {
            last_known_state: WorkerStatus::Running
        })
    );
    assert_eq!(worker.last_strategy, Some(RecoveryStrategy::DelayedRestart { delay_ms: 20 }));
}

#[tokio::test]
async fn test_closed_output_counts_as_crash() {
    let (transport, supervisor) = supervisor();
    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(running(&supervisor, "dev1").await);

    transport.close_output("/work/dev1");
    assert!(
        wait_for(|| supervisor
            .get_worker_status("dev1")
            .map(|w| w.restart_count == 1 && w.status == WorkerStatus::Running)
            .unwrap_or(false))
        .await
    );
    assert_eq!(transport.spawn_count("/work/dev1"), 2);
}

#[tokio::test]
async fn test_resource_alerts() {
    let (_, supervisor) = supervisor();
    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(running(&supervisor, "dev1").await);

    assert!(supervisor.report_resource_alert("dev1", "memory", 100.0));
    assert_eq!(status_of(&supervisor, "dev1"), Some(WorkerStatus::Running));

    assert!(supervisor.report_resource_alert("dev1", "memory", 1e6));
    assert_eq!(status_of(&supervisor, "dev1"), Some(WorkerStatus::Unhealthy));

    assert!(supervisor.report_resource_alert("dev1", "memory", 1e6));
    assert!(
        wait_for(|| supervisor
            .get_worker_status("dev1")
            .map(|w| w.restart_count == 1 && w.status == WorkerStatus::Running)
            .unwrap_or(false))
        .await
    );
    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(worker.last_strategy, Some(RecoveryStrategy::ImmediateRestart));
    assert_eq!(
        worker.last_error,
        Some(ProcessError::ResourceExhaustion {
            resource_name: "memory".into()
        })
    );
}

#[tokio::test]
async fn test_input_is_relayed_to_output_feed() {
    let (transport, supervisor) = supervisor();
    let mut feed = supervisor.subscribe_output();

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(supervisor.send_input("dev1", "hello\n").await);

    let event = tokio::time::timeout(Duration::from_secs(1), feed.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.pane_id, "dev1");
    assert_eq!(event.text, "hello\n");

    let session = supervisor.get_worker_status("dev1").unwrap().session_id.unwrap();
    assert_eq!(transport.written(&session).as_deref(), Some("hello\n"));

    let responses = supervisor.get_response_time_stats("dev1").available().unwrap();
    assert!(!responses.recent_history.is_empty());
}

#[tokio::test]
async fn test_heartbeat_updates_worker() {
    let (_, supervisor) = supervisor();
    assert!(supervisor.start_worker("dev1", "/work/dev1").await);

    assert!(supervisor.heartbeat("dev1").await);
    assert!(supervisor.get_worker_status("dev1").unwrap().last_heartbeat.is_some());
}

#[tokio::test]
async fn test_preventive_restart_keeps_restart_count() {
    let config = SupervisorConfig {
        preventive_restart_interval_ms: 150,
        ..fast_config()
    };
    let (transport, supervisor) = supervisor_with(config);
    supervisor.start().unwrap();

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(
        wait_for(|| supervisor
            .get_worker_status("dev1")
            .map(|w| w.preventive_restarts >= 1 && w.status == WorkerStatus::Running)
            .unwrap_or(false))
        .await
    );

    let worker = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(worker.restart_count, 0);
    assert!(transport.spawn_count("/work/dev1") >= 2);
    assert!(supervisor.stats().preventive_restarts >= 1);

    supervisor.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_session_snapshot_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(JsonFileStore::new(dir.path()));
    let config = SupervisorConfig {
        session_persistence_enabled: true,
        ..fast_config()
    };
    let transport = Arc::new(ScriptedTransport::new());
    let supervisor = Supervisor::new(config, transport, Some(store.clone()));

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    let first = supervisor.get_worker_status("dev1").unwrap();
    assert!(first.resumed_from.is_none());
    let first_session = first.session_id.unwrap();

    assert!(supervisor.stop_worker("dev1").await);
    let saved = store.load("dev1").await.unwrap().unwrap();
    assert_eq!(saved.session_id, first_session);

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    let resumed = supervisor.get_worker_status("dev1").unwrap();
    assert_eq!(resumed.resumed_from, Some(first_session));
}

#[tokio::test]
async fn test_persistence_disabled_ignores_store() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn SessionStore> = Arc::new(JsonFileStore::new(dir.path()));
    let transport = Arc::new(ScriptedTransport::new());
    let supervisor = Supervisor::new(fast_config(), transport, Some(store.clone()));

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(supervisor.stop_worker("dev1").await);
    assert!(store.load("dev1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_shutdown_releases_workers() {
    let (transport, supervisor) = supervisor();
    supervisor.start().unwrap();
    assert!(supervisor.start().is_err());

    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(supervisor.start_worker("dev2", "/work/dev2").await);

    supervisor.shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(supervisor.is_shutting_down());
    assert!(supervisor.list_workers().is_empty());
    assert_eq!(transport.live_sessions(), 0);

    assert!(!supervisor.start_worker("dev3", "/work/dev3").await);
    assert!(supervisor.start().is_err());
    supervisor.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn test_stats_snapshot() {
    let (_, supervisor) = supervisor();
    assert!(supervisor.start_worker("dev1", "/work/dev1").await);
    assert!(supervisor.start_worker("dev2", "/work/dev2").await);
    assert!(running(&supervisor, "dev1").await);
    assert!(running(&supervisor, "dev2").await);

    let stats = supervisor.stats();
    assert_eq!(stats.total_workers, 2);
    assert_eq!(stats.running, 2);
    assert_eq!(stats.total_started, 2);
    assert_eq!(stats.total_restarts, 0);
    assert!(stats.ipc.processed_requests >= 4);
    assert_eq!(stats.ipc.bound_sessions, 2);
    assert_eq!(stats.fleet.running, 2);
    assert!((stats.fleet.total_memory_mb - 256.0).abs() < f64::EPSILON);
    assert!(stats.to_string().contains("mem=256MB"));
}
