//! Daemon process spawning and output/exit event streaming.
//!
//! Each launched daemon gets a reader task that owns the OS child. The task
//! forwards stdout as [`DaemonEvent::Output`] chunks in emission order and
//! finishes with exactly one [`DaemonEvent::Exited`].

use super::SupervisorError;
use crate::credential::Credential;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

/// Requested GUI/API listen address.
pub const ENV_GUI_ADDRESS: &str = "STGUIADDRESS";

/// API key the daemon must require on REST calls.
pub const ENV_API_KEY: &str = "STGUIAPIKEY";

/// Disables the daemon's own restart monitor.
pub const ENV_NO_RESTART: &str = "STNORESTART";

pub const ENV_HOME: &str = "HOME";

/// Names the launcher sets itself; user-supplied extras may not override them.
pub const RESERVED_ENV: &[&str] = &[ENV_GUI_ADDRESS, ENV_API_KEY, ENV_NO_RESTART, ENV_HOME];

/// Size of a single stdout read.
const READ_CHUNK_BYTES: usize = 8192;

/// How long the daemon gets to exit after SIGTERM before it is killed.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How a daemon run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exit code 0 without a signal.
    Clean,
    /// Non-zero exit code.
    Code(i32),
    /// Terminated by a signal (Unix).
    Signal(i32),
    /// Exit status could not be determined.
    Lost,
}

impl ExitKind {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return if code == 0 {
                Self::Clean
            } else {
                Self::Code(code)
            };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signal(signal);
            }
        }
        Self::Lost
    }

    pub fn is_clean(self) -> bool {
        self == Self::Clean
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "exit code 0"),
            Self::Code(code) => write!(f, "exit code {}", code),
            Self::Signal(signal) => write!(f, "signal {}", signal),
            Self::Lost => write!(f, "unknown exit status"),
        }
    }
}

/// Event produced by a running daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    /// A chunk of stdout. Boundaries are arbitrary.
    Output(String),
    /// Terminal event; nothing follows it.
    Exited(ExitKind),
}

/// Environment handed to one daemon launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonEnv {
    pub gui_address: String,
    pub api_key: Credential,
    pub home: Option<OsString>,
    pub extra: Vec<(String, String)>,
}

impl DaemonEnv {
    /// The complete child environment; nothing else is inherited.
    pub fn vars(&self) -> Vec<(OsString, OsString)> {
        let mut vars: Vec<(OsString, OsString)> = vec![
            (ENV_GUI_ADDRESS.into(), self.gui_address.clone().into()),
            (ENV_API_KEY.into(), self.api_key.expose().into()),
            (ENV_NO_RESTART.into(), "1".into()),
        ];
        if let Some(home) = &self.home {
            vars.push((ENV_HOME.into(), home.clone()));
        }
        for (key, value) in &self.extra {
            if RESERVED_ENV.contains(&key.as_str()) {
                continue;
            }
            vars.push((key.into(), value.into()));
        }
        vars
    }
}

/// Handle to one launched daemon, owned by the supervisor.
pub struct DaemonProcess {
    pid: Option<u32>,
    events: mpsc::UnboundedReceiver<DaemonEvent>,
    stop: Option<oneshot::Sender<()>>,
    exited: bool,
}

impl DaemonProcess {
    /// Dropping `stop` (or the whole handle) asks the process to terminate.
    pub fn new(
        pid: Option<u32>,
        events: mpsc::UnboundedReceiver<DaemonEvent>,
        stop: oneshot::Sender<()>,
    ) -> Self {
        Self {
            pid,
            events,
            stop: Some(stop),
            exited: false,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Waits for the next event. A stream that ends without an exit status
    /// is reported as [`ExitKind::Lost`].
    pub async fn next_event(&mut self) -> DaemonEvent {
        if self.exited {
            return DaemonEvent::Exited(ExitKind::Lost);
        }
        let event = self
            .events
            .recv()
            .await
            .unwrap_or(DaemonEvent::Exited(ExitKind::Lost));
        if matches!(event, DaemonEvent::Exited(_)) {
            self.exited = true;
        }
        event
    }

    /// Asks the daemon to terminate. Its exit still arrives as an event.
    pub fn request_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl fmt::Debug for DaemonProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonProcess")
            .field("pid", &self.pid)
            .field("exited", &self.exited)
            .finish()
    }
}

/// Starts daemon processes. Implemented by the real OS launcher and by
/// scripted launchers in tests.
pub trait DaemonLauncher: Send {
    fn launch(&mut self, env: &DaemonEnv) -> Result<DaemonProcess, SupervisorError>;
}

/// Launches the daemon binary as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    binary: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(binary: PathBuf, args: Vec<String>) -> Self {
        Self { binary, args }
    }
}

impl DaemonLauncher for ProcessLauncher {
    fn launch(&mut self, env: &DaemonEnv) -> Result<DaemonProcess, SupervisorError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.args)
            .env_clear()
            .envs(env.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches the host, not the daemon.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SupervisorError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or(SupervisorError::MissingStdout)?;
        let pid = child.id();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(pump_events(child, stdout, event_tx, stop_rx));

        Ok(DaemonProcess::new(pid, event_rx, stop_tx))
    }
}

/// Reader task: forwards stdout, handles stop requests, reports the exit.
async fn pump_events(
    mut child: Child,
    mut stdout: ChildStdout,
    events: mpsc::UnboundedSender<DaemonEvent>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    let mut decoder = Utf8ChunkDecoder::default();
    let mut stdout_open = true;
    let mut stopping = false;
    let mut killed = false;
    let grace = tokio::time::sleep(STOP_GRACE_PERIOD);
    tokio::pin!(grace);

    let status = loop {
        tokio::select! {
            read = stdout.read(&mut buf), if stdout_open => match read {
                Ok(0) => stdout_open = false,
                Ok(n) => {
                    let text = decoder.decode(&buf[..n]);
                    if !text.is_empty() {
                        let _ = events.send(DaemonEvent::Output(text));
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read daemon output");
                    stdout_open = false;
                }
            },
            status = child.wait(), if !stdout_open => break status,
            // Resolves on an explicit request or when the handle is dropped.
            _ = &mut stop, if !stopping => {
                stopping = true;
                grace
                    .as_mut()
                    .reset(tokio::time::Instant::now() + STOP_GRACE_PERIOD);
                send_terminate(&mut child);
            }
            () = &mut grace, if stopping && !killed => {
                tracing::warn!(
                    "Daemon did not exit within {:?}, killing",
                    STOP_GRACE_PERIOD
                );
                killed = true;
                let _ = child.start_kill();
            }
        }
    };

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = events.send(DaemonEvent::Output(tail));
    }

    let exit = match status {
        Ok(status) => ExitKind::from_status(status),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to wait for daemon");
            ExitKind::Lost
        }
    };
    let _ = events.send(DaemonEvent::Exited(exit));
}

fn send_terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                return;
            }
        }
    }
    let _ = child.start_kill();
}

/// Decodes a byte stream as UTF-8, holding back sequences split by a read.
#[derive(Debug, Default)]
pub(crate) struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    let Some(invalid_len) = e.error_len() else {
                        // Incomplete trailing sequence: wait for the rest.
                        let rest = self.pending.split_off(valid_up_to);
                        text.push_str(&String::from_utf8_lossy(&self.pending));
                        self.pending = rest;
                        break;
                    };
                    let rest = self.pending.split_off(valid_up_to + invalid_len);
                    text.push_str(&String::from_utf8_lossy(&self.pending));
                    self.pending = rest;
                }
            }
        }
        text
    }

    pub(crate) fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
#[path = "tests/launcher_tests.rs"]
mod tests;
