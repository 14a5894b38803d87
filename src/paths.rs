//! Home-based storage paths under `~/.syncbar/`:
//! - `config.yaml` - Shell configuration
//! - `logs/syncbar.log` - Application log

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const SYNCBAR_DIR: &str = ".syncbar";

const CONFIG_FILE: &str = "config.yaml";

const LOG_FILE: &str = "syncbar.log";

/// Returns `~/.syncbar/`, creating it if needed.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined or the
/// directory cannot be created.
pub fn syncbar_home_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    syncbar_home_dir_in(&home)
}

/// Returns the default config path: `~/.syncbar/config.yaml`
pub fn config_path() -> Result<PathBuf> {
    Ok(config_path_in(&syncbar_home_dir()?))
}

/// Returns the logs directory: `~/.syncbar/logs/`
///
/// Creates the directory if it doesn't exist.
pub fn logs_dir() -> Result<PathBuf> {
    logs_dir_in(&syncbar_home_dir()?)
}

/// Returns the application log path: `~/.syncbar/logs/syncbar.log`
pub fn log_path() -> Result<PathBuf> {
    Ok(logs_dir()?.join(LOG_FILE))
}

/// Returns the fallback daemon location: `~/bin/syncthing`
pub fn home_bin_daemon(binary_name: &str) -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("bin").join(binary_name))
}

fn syncbar_home_dir_in(home: &Path) -> Result<PathBuf> {
    ensure_dir(home.join(SYNCBAR_DIR))
}

fn config_path_in(base: &Path) -> PathBuf {
    base.join(CONFIG_FILE)
}

fn logs_dir_in(base: &Path) -> Result<PathBuf> {
    ensure_dir(base.join("logs"))
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    Ok(dir)
}
