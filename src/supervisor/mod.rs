//! Daemon lifecycle supervision.
//!
//! The supervisor launches the daemon with a fixed API key, watches its output
//! for the API address, publishes the resulting session to the broker, and
//! decides what an exit means:
//!
//! - exit code 0: the daemon asked the whole application to quit
//! - anything else: a crash, relaunched immediately with the same key
//!
//! ## States
//!
//! `Idle -> Starting -> Running -> {Restarting -> Starting, Terminating -> Idle}`
//!
//! All events for a daemon are handled on the task driving [`ProcessSupervisor::run`],
//! so an exit is always fully processed before the next launch and at most
//! one daemon is alive at a time.

pub mod launcher;

pub use launcher::{
    DaemonEnv, DaemonEvent, DaemonLauncher, DaemonProcess, ExitKind, ProcessLauncher,
};

use crate::credential::Credential;
use crate::endpoint::EndpointExtractor;
use crate::session_broker::SessionBroker;
use std::ffi::OsString;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Ask the OS for an ephemeral port on loopback.
pub const DEFAULT_GUI_ADDRESS: &str = "http://127.0.0.1:0";

/// Keeps the daemon from opening a browser on startup.
pub const DEFAULT_DAEMON_ARGS: &[&str] = &["-no-browser"];

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to launch daemon {}", .binary.display())]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },

    #[error("daemon is already running")]
    AlreadyRunning,

    #[error("daemon stdout was not captured")]
    MissingStdout,

    #[error("daemon crashed {attempts} times in a row before announcing its API address")]
    RestartLimit { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Restarting,
    Terminating,
}

/// Why [`ProcessSupervisor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The daemon exited with code 0; the host should quit.
    DaemonRequested,
    /// The host asked for shutdown and the daemon has been stopped.
    HostRequested,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Value for `STGUIADDRESS` on a fresh start.
    pub gui_address: String,
    /// Passed through as `HOME`.
    pub home: Option<OsString>,
    /// Consecutive pre-announcement crashes tolerated; `None` restarts forever.
    pub restart_limit: Option<u32>,
    /// Additional environment for the daemon.
    pub extra_env: Vec<(String, String)>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            gui_address: DEFAULT_GUI_ADDRESS.to_string(),
            home: std::env::var_os("HOME"),
            restart_limit: None,
            extra_env: Vec::new(),
        }
    }
}

/// Owns the daemon child process and its restart policy.
pub struct ProcessSupervisor<L> {
    launcher: L,
    config: SupervisorConfig,
    credential: Credential,
    broker: Arc<SessionBroker>,
    extractor: EndpointExtractor,
    state: SupervisorState,
    daemon: Option<DaemonProcess>,
    diagnostics: Box<dyn Write + Send>,
    /// Address announced by the last run that got far enough to announce one.
    address_hint: Option<String>,
    restarts: u32,
    failed_starts: u32,
    /// Set once the host asks to stop; no exit after this is a crash.
    shutdown_requested: bool,
}

impl<L: DaemonLauncher> ProcessSupervisor<L> {
    /// Creates an idle supervisor. The API key is generated here, once.
    pub fn new(launcher: L, config: SupervisorConfig, broker: Arc<SessionBroker>) -> Self {
        Self {
            launcher,
            config,
            credential: Credential::generate(),
            broker,
            extractor: EndpointExtractor::new(),
            state: SupervisorState::Idle,
            daemon: None,
            diagnostics: Box::new(std::io::stderr()),
            address_hint: None,
            restarts: 0,
            failed_starts: 0,
            shutdown_requested: false,
        }
    }

    /// Replaces the sink that receives a verbatim copy of daemon stdout.
    pub fn with_diagnostics(mut self, sink: impl Write + Send + 'static) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Number of crash restarts performed so far.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    fn daemon_env(&self) -> DaemonEnv {
        DaemonEnv {
            gui_address: self
                .address_hint
                .clone()
                .unwrap_or_else(|| self.config.gui_address.clone()),
            api_key: self.credential.clone(),
            home: self.config.home.clone(),
            extra: self.config.extra_env.clone(),
        }
    }

    /// Launches the daemon. Valid from `Idle` and `Restarting`.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if !matches!(
            self.state,
            SupervisorState::Idle | SupervisorState::Restarting
        ) {
            return Err(SupervisorError::AlreadyRunning);
        }
        if let Some(mut previous) = self.daemon.take() {
            if !previous.has_exited() {
                previous.request_stop();
            }
        }

        self.state = SupervisorState::Starting;
        let env = self.daemon_env();
        tracing::info!(gui_address = %env.gui_address, "Starting daemon");

        match self.launcher.launch(&env) {
            Ok(process) => {
                tracing::debug!(pid = ?process.pid(), "Daemon launched");
                self.daemon = Some(process);
                self.extractor.reset();
                self.state = SupervisorState::Running;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to launch daemon");
                self.state = SupervisorState::Idle;
                Err(e)
            }
        }
    }

    /// Applies one daemon event to the state machine.
    ///
    /// Returns `Some` when the supervisor has stopped and the host should act.
    pub fn handle_event(
        &mut self,
        event: DaemonEvent,
    ) -> Result<Option<SupervisorExit>, SupervisorError> {
        match event {
            DaemonEvent::Output(chunk) => {
                self.on_output(&chunk);
                Ok(None)
            }
            DaemonEvent::Exited(exit) => self.on_exit(exit),
        }
    }

    fn on_output(&mut self, chunk: &str) {
        let _ = self.diagnostics.write_all(chunk.as_bytes());
        let _ = self.diagnostics.flush();

        if let Some(endpoint) = self.extractor.feed(chunk) {
            tracing::info!(%endpoint, "Daemon API announced");
            self.address_hint = Some(endpoint.gui_address());
            self.failed_starts = 0;
            self.broker.bind(endpoint, self.credential.clone());
        }
    }

    fn on_exit(&mut self, exit: ExitKind) -> Result<Option<SupervisorExit>, SupervisorError> {
        if self.shutdown_requested || self.state == SupervisorState::Terminating {
            tracing::info!(%exit, "Daemon stopped");
            self.release();
            return Ok(Some(SupervisorExit::HostRequested));
        }

        if exit.is_clean() {
            tracing::info!("Daemon exited cleanly, shutting down");
            self.state = SupervisorState::Terminating;
            self.release();
            return Ok(Some(SupervisorExit::DaemonRequested));
        }

        tracing::warn!(%exit, restarts = self.restarts, "Daemon crashed, restarting");
        self.state = SupervisorState::Restarting;
        self.broker.unbind();

        if !self.extractor.is_found() {
            self.failed_starts += 1;
            self.address_hint = None;
            if let Some(limit) = self.config.restart_limit {
                if self.failed_starts > limit {
                    tracing::error!(attempts = self.failed_starts, "Giving up on daemon");
                    self.release();
                    return Err(SupervisorError::RestartLimit {
                        attempts: self.failed_starts,
                    });
                }
            }
        }

        self.restarts += 1;
        self.start()?;
        Ok(None)
    }

    /// Drops the exited daemon handle and returns to `Idle`.
    fn release(&mut self) {
        self.daemon = None;
        self.broker.unbind();
        self.state = SupervisorState::Idle;
    }

    /// Moves a running daemon to `Terminating` and asks it to stop.
    fn begin_shutdown(&mut self) {
        self.shutdown_requested = true;
        match self.daemon.as_mut() {
            Some(daemon) if self.state == SupervisorState::Running => {
                tracing::info!("Stopping daemon");
                self.state = SupervisorState::Terminating;
                daemon.request_stop();
            }
            _ => {}
        }
    }

    async fn next_daemon_event(daemon: &mut Option<DaemonProcess>) -> Option<DaemonEvent> {
        match daemon {
            Some(process) => Some(process.next_event().await),
            None => None,
        }
    }

    /// Drives the daemon until it asks the host to quit or `shutdown` resolves.
    ///
    /// Starts the daemon first if idle. Spawn failures, including on restart,
    /// are returned rather than retried.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<SupervisorExit, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        if self.state == SupervisorState::Idle {
            self.start()?;
        }
        tokio::pin!(shutdown);

        loop {
            // Shutdown is checked first so a pending exit is never restarted.
            let event = tokio::select! {
                biased;
                () = &mut shutdown, if !self.shutdown_requested => {
                    self.begin_shutdown();
                    continue;
                }
                event = Self::next_daemon_event(&mut self.daemon) => event,
            };

            let Some(event) = event else {
                self.release();
                return Ok(SupervisorExit::HostRequested);
            };
            if let Some(exit) = self.handle_event(event)? {
                return Ok(exit);
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/supervisor_tests.rs"]
mod tests;
