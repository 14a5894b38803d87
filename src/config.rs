use crate::paths;
use crate::status::{DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use crate::supervisor::launcher::RESERVED_ENV;
use crate::supervisor::{SupervisorConfig, DEFAULT_DAEMON_ARGS, DEFAULT_GUI_ADDRESS};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Executable looked up on `PATH` when no binary is configured.
pub const DAEMON_BINARY_NAME: &str = "syncthing";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Explicit daemon executable. Searched on `PATH` when absent.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    #[serde(default = "default_daemon_args")]
    pub args: Vec<String>,
    #[serde(default = "default_gui_address")]
    pub gui_address: String,
    /// Consecutive crashes before announcing tolerated; unset means restart forever.
    #[serde(default)]
    pub restart_limit: Option<u32>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            binary: None,
            args: default_daemon_args(),
            gui_address: default_gui_address(),
            restart_limit: None,
            env: BTreeMap::new(),
        }
    }
}

fn default_daemon_args() -> Vec<String> {
    DEFAULT_DAEMON_ARGS.iter().map(|s| s.to_string()).collect()
}

fn default_gui_address() -> String {
    DEFAULT_GUI_ADDRESS.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl StatusConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl ShellConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Loads the explicit path, or `~/.syncbar/config.yaml` when none is given.
    ///
    /// An explicit path must exist.
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Self::load_or_default(&paths::config_path()?),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.daemon.gui_address.trim().is_empty() {
            anyhow::bail!("daemon.gui_address must not be empty");
        }

        for key in self.daemon.env.keys() {
            if RESERVED_ENV.contains(&key.as_str()) {
                anyhow::bail!(
                    "daemon.env cannot set '{}'; it is managed by the supervisor",
                    key
                );
            }
        }

        if self.status.poll_interval_secs == 0 {
            anyhow::bail!("status.poll_interval_secs must be greater than zero");
        }
        if self.status.timeout_secs == 0 {
            anyhow::bail!("status.timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// Renders the effective configuration, e.g. for debug logging.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config")
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            gui_address: self.daemon.gui_address.clone(),
            restart_limit: self.daemon.restart_limit,
            extra_env: self
                .daemon
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ..SupervisorConfig::default()
        }
    }
}

/// Picks the daemon executable: CLI flag, then config, then `PATH`, then `~/bin`.
pub fn resolve_daemon_binary(cli: Option<&Path>, configured: Option<&Path>) -> Result<PathBuf> {
    resolve_daemon_binary_with(
        cli,
        configured,
        || which::which(DAEMON_BINARY_NAME).ok(),
        paths::home_bin_daemon(DAEMON_BINARY_NAME),
    )
}

fn resolve_daemon_binary_with<F>(
    cli: Option<&Path>,
    configured: Option<&Path>,
    search_path: F,
    home_fallback: Option<PathBuf>,
) -> Result<PathBuf>
where
    F: FnOnce() -> Option<PathBuf>,
{
    if let Some(path) = cli.or(configured) {
        return Ok(path.to_path_buf());
    }
    if let Some(found) = search_path() {
        return Ok(found);
    }
    match home_fallback {
        Some(path) if path.is_file() => Ok(path),
        _ => anyhow::bail!(
            "Could not find the '{}' binary; install it on PATH or pass --daemon",
            DAEMON_BINARY_NAME
        ),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
