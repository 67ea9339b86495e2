//! JSON-lines logging into the workspace `logs/` directory.

use crate::infrastructure::error::InfraError;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILE: &str = "alarmclock.log";

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
///
/// Returns `Ok(false)` when a subscriber was already installed (tests, or a
/// host application that configured its own).
pub fn init_logging(logs_dir: &Path, default_level: &str) -> Result<bool, InfraError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|error| InfraError::Logging(format!("invalid log filter '{default_level}': {error}")))?;

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(logs_dir))?;

    let installed = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .with_target(true)
        .with_writer(Mutex::new(file))
        .try_init()
        .is_ok();
    Ok(installed)
}

pub fn log_file_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(LOG_FILE)
}
