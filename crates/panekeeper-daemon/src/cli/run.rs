use panekeeper_daemon::{DaemonConfig, Supervisor};
use panekeeper_types::{PanekeeperError, PanekeeperResult};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run_daemon(config: DaemonConfig, pid_file: Option<PathBuf>) -> PanekeeperResult<()> {
    info!("Starting Panekeeper v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", config.data_dir);

    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        PanekeeperError::Config(format!("Failed to create data directory: {}", e))
    })?;

    if let Some(ref pid_path) = pid_file {
        std::fs::write(pid_path, std::process::id().to_string())
            .map_err(|e| PanekeeperError::Config(format!("Failed to write PID file: {}", e)))?;
        info!("PID file written: {:?}", pid_path);
    }

    config.log_warnings();

    let supervisor = Supervisor::from_config(&config);
    supervisor.start()?;

    let mut started = 0;
    for spec in &config.workers {
        if supervisor
            .start_worker(&spec.pane_id, &spec.working_directory)
            .await
        {
            started += 1;
        } else {
            error!("Worker {} could not be started in {:?}", spec.pane_id, spec.working_directory);
        }
    }
    info!("{} of {} configured workers started", started, config.workers.len());

    let reporter = {
        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(STATS_LOG_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                info!("{}", supervisor.stats());
            }
        })
    };

    let signal = wait_for_shutdown().await;
    reporter.abort();

    info!("Shutting down...");
    supervisor.shutdown(SHUTDOWN_TIMEOUT).await?;

    if let Some(ref pid_path) = pid_file {
        if let Err(e) = std::fs::remove_file(pid_path) {
            warn!("Failed to remove PID file {:?}: {}", pid_path, e);
        }
    }

    signal?;
    info!("Shutdown complete");
    Ok(())
}

async fn wait_for_shutdown() -> PanekeeperResult<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => { info!("Received SIGTERM"); }
            _ = sigint.recv() => { info!("Received SIGINT"); }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
