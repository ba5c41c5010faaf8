//! Platform paths and environment overrides.

use crate::error::{Result, TaskctlError};
use std::path::PathBuf;

pub const DB_PATH_ENV: &str = "TASKCTL_DB_PATH";
pub const LOG_LEVEL_ENV: &str = "TASKCTL_LOG_LEVEL";

const APP_DIR: &str = "taskctl";
const DB_FILE: &str = "taskctl.db";
const CONFIG_FILE: &str = "config.json";
const LOGS_DIR: &str = "logs";

/// `<platform-data-dir>/taskctl`.
pub fn data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .ok_or(TaskctlError::DataDirNotFound)
}

/// Store location, `TASKCTL_DB_PATH` winning over the platform default.
pub fn db_path() -> Result<PathBuf> {
    if let Some(over) = std::env::var_os(DB_PATH_ENV) {
        return Ok(PathBuf::from(over));
    }
    Ok(data_dir()?.join(DB_FILE))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join(CONFIG_FILE))
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join(LOGS_DIR))
}
