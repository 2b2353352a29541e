use panekeeper_daemon::DaemonConfig;
use panekeeper_types::PanekeeperResult;
use std::io::Write;
use std::path::{Path, PathBuf};

const OK: &str = "\x1b[38;5;46mOK\x1b[0m";
const WARN: &str = "\x1b[38;5;226mWARN\x1b[0m";
const FAIL: &str = "\x1b[38;5;196mFAIL\x1b[0m";

#[derive(Default)]
struct Tally {
    passed: u32,
    warnings: u32,
    failed: u32,
}

/// Locate an executable the way the shell would: paths are taken as given,
/// bare names are searched on `PATH`.
pub fn resolve_command(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(command))
        .find(|p| p.is_file())
}

fn label(step: &str) -> PanekeeperResult<()> {
    print!("{:<28}", step);
    std::io::stdout().flush()?;
    Ok(())
}

pub fn run_checks(config_path: &Path, loaded: PanekeeperResult<DaemonConfig>) -> PanekeeperResult<()> {
    println!("\x1b[38;5;46mPanekeeper Diagnostics\x1b[0m");
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!();

    let mut tally = Tally::default();

    label("[1/5] Configuration:")?;
    let config = match loaded {
        Ok(config) if config_path.exists() => {
            println!("{}", OK);
            tally.passed += 1;
            config
        }
        Ok(config) => {
            println!("{} - No file at {:?}, using defaults", WARN, config_path);
            tally.warnings += 1;
            config
        }
        Err(e) => {
            println!("{} - {}", FAIL, e);
            tally.failed += 1;
            DaemonConfig::default()
        }
    };

    label("[2/5] Data Directory:")?;
    if config.data_dir.is_dir() {
        println!("{}", OK);
        tally.passed += 1;
    } else if config.data_dir.exists() {
        println!("{} - Not a directory", FAIL);
        tally.failed += 1;
    } else {
        println!("{} - Will be created on start", WARN);
        tally.warnings += 1;
    }

    label("[3/5] Session Command:")?;
    match resolve_command(&config.session.command) {
        Some(path) => {
            println!("{} ({})", OK, path.display());
            tally.passed += 1;
        }
        None => {
            println!("{} - '{}' not found", FAIL, config.session.command);
            tally.failed += 1;
        }
    }

    label("[4/5] Worker Directories:")?;
    let missing: Vec<&str> = config
        .workers
        .iter()
        .filter(|w| !w.working_directory.is_dir())
        .map(|w| w.pane_id.as_str())
        .collect();
    if config.workers.is_empty() {
        println!("{} - No workers configured", WARN);
        tally.warnings += 1;
    } else if missing.is_empty() {
        println!("{} ({} workers)", OK, config.workers.len());
        tally.passed += 1;
    } else {
        println!("{} - Missing for {}", FAIL, missing.join(", "));
        tally.failed += 1;
    }

    label("[5/5] Session Snapshots:")?;
    if !config.supervisor.session_persistence_enabled {
        println!("{} (disabled)", OK);
        tally.passed += 1;
    } else {
        let dir = config.sessions_dir();
        match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                println!("{} ({})", OK, dir.display());
                tally.passed += 1;
            }
            Err(e) => {
                println!("{} - {}", FAIL, e);
                tally.failed += 1;
            }
        }
    }

    println!();
    println!("\x1b[38;5;245m{}\x1b[0m", "═".repeat(50));
    println!(
        "Results: \x1b[38;5;46m{} passed\x1b[0m, \x1b[38;5;226m{} warnings\x1b[0m, \x1b[38;5;196m{} failed\x1b[0m",
        tally.passed, tally.warnings, tally.failed
    );

    if tally.failed > 0 {
        println!("\n\x1b[38;5;196mSome checks failed. Fix issues before running.\x1b[0m");
    } else if tally.warnings > 0 {
        println!("\n\x1b[38;5;226mAll critical checks passed. Some warnings may need attention.\x1b[0m");
    } else {
        println!("\n\x1b[38;5;46mAll checks passed! Ready to run.\x1b[0m");
    }

    Ok(())
}
