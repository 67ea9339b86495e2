use crate::infrastructure::alarm_repository::initialize_database;
use crate::infrastructure::config::{ensure_default_configs, load_alarm_defaults, read_log_level};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging::init_logging;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
    pub logs_dir: PathBuf,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("alarms.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let _ = load_alarm_defaults(&config_dir)?;
    let level = read_log_level(&config_dir)?;
    if !init_logging(&logs_dir, &level)? {
        debug!(
            logs_dir = %logs_dir.display(),
            "global subscriber already installed, workspace log file not attached"
        );
    }
    initialize_database(&database_path)?;

    info!(workspace = %workspace_root.display(), "workspace ready");
    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        database_path,
        logs_dir,
    })
}
