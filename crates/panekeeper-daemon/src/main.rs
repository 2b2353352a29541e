mod cli;

use clap::Parser;
use cli::{handle_config, init_logging, run_checks, run_daemon, show_version, Cli, Commands};
use panekeeper_daemon::{default_data_dir, DaemonConfig};
use panekeeper_types::PanekeeperResult;

#[tokio::main]
async fn main() -> PanekeeperResult<()> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli.config.clone().unwrap_or_else(|| data_dir.join("config.toml"));

    let loaded = DaemonConfig::load(&config_path).map(|mut config| {
        if cli.data_dir.is_some() {
            config.data_dir = data_dir.clone();
        }
        config
    });

    let (logging, log_dir) = match &loaded {
        Ok(config) => (config.logging.clone(), config.data_dir.clone()),
        Err(_) => (Default::default(), data_dir.clone()),
    };
    init_logging(&cli, &logging, &log_dir)?;

    match cli.command {
        Commands::Run { pid_file } => {
            run_daemon(loaded?, pid_file).await?;
        }
        Commands::Config { action } => {
            handle_config(&config_path, loaded, action, cli.format)?;
        }
        Commands::Check => {
            run_checks(&config_path, loaded)?;
        }
        Commands::Version => {
            show_version();
        }
    }

    Ok(())
}
