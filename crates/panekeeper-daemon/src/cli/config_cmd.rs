use super::commands::{ConfigAction, OutputFormat};
use panekeeper_daemon::config::WarningSeverity;
use panekeeper_daemon::DaemonConfig;
use panekeeper_types::{PanekeeperError, PanekeeperResult};
use std::path::Path;

pub fn handle_config(
    config_path: &Path,
    loaded: PanekeeperResult<DaemonConfig>,
    action: Option<ConfigAction>,
    format: OutputFormat,
) -> PanekeeperResult<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let config = loaded?;
            if !config_path.exists() {
                println!("\x1b[38;5;245mNo configuration file at {:?}, showing defaults\x1b[0m", config_path);
            }
            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&config.redacted())
                        .map_err(|e| PanekeeperError::Serialization(e.to_string()))?;
                    println!("{}", json);
                }
                OutputFormat::Text => print!("{}", config.redacted()),
            }
        }
        Some(ConfigAction::Validate) => match loaded {
            Ok(config) => {
                println!("\x1b[38;5;46m[+]\x1b[0m Configuration is valid");
                for warning in config.check_warnings() {
                    let tag = match warning.severity {
                        WarningSeverity::High => "\x1b[38;5;196m[!]\x1b[0m",
                        WarningSeverity::Medium => "\x1b[38;5;226m[!]\x1b[0m",
                        WarningSeverity::Low => "\x1b[38;5;245m[i]\x1b[0m",
                    };
                    println!("{} {}", tag, warning.message);
                    println!("    {}", warning.recommendation);
                }
            }
            Err(e) => {
                println!("\x1b[38;5;196m[-]\x1b[0m Configuration error: {}", e);
                return Err(e);
            }
        },
        Some(ConfigAction::Init { force }) => {
            if config_path.exists() && !force {
                return Err(PanekeeperError::Config(format!(
                    "{:?} already exists (use --force to overwrite)",
                    config_path
                )));
            }
            DaemonConfig::default().save(config_path)?;
            println!("\x1b[38;5;46m[+]\x1b[0m Wrote default configuration to {:?}", config_path);
        }
    }
    Ok(())
}
