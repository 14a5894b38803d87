mod config;
mod credential;
mod endpoint;
mod logging;
mod paths;
mod session_broker;
mod status;
mod supervisor;
mod window;

use anyhow::Result;
use clap::Parser;
use config::ShellConfig;
use session_broker::SessionBroker;
use status::StatusPoller;
use std::path::PathBuf;
use std::sync::Arc;
use supervisor::{ProcessLauncher, ProcessSupervisor, SupervisorExit};
use window::UrlAnnouncer;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SYNCBAR_GIT_SHA"), ")");

#[derive(Parser)]
#[command(name = "syncbar")]
#[command(about = "Runs a Syncthing daemon and keeps it alive")]
#[command(version = VERSION)]
struct Cli {
    /// Path to the syncthing executable
    #[arg(long, value_name = "PATH")]
    daemon: Option<PathBuf>,

    /// Address the daemon GUI should listen on
    #[arg(long, value_name = "URL")]
    gui_address: Option<String>,

    /// Config file (defaults to ~/.syncbar/config.yaml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Seconds between status polls
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Disable the status readout
    #[arg(long)]
    no_status: bool,

    /// Give up after this many consecutive crashes before the API comes up
    #[arg(long, value_name = "N")]
    restart_limit: Option<u32>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut ShellConfig) {
        if let Some(address) = &self.gui_address {
            config.daemon.gui_address = address.clone();
        }
        if let Some(secs) = self.poll_interval {
            config.status.poll_interval_secs = secs;
        }
        if self.no_status {
            config.status.enabled = false;
        }
        if self.restart_limit.is_some() {
            config.daemon.restart_limit = self.restart_limit;
        }
    }
}

/// Resolves when the host is asked to stop (Ctrl-C, or SIGTERM on Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => tracing::warn!(error = %e, "Failed to install SIGTERM handler"),
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_file = match paths::log_path() {
        Ok(path) => Some(path),
        Err(e) => {
            eprintln!("[syncbar] Warning: log file disabled: {:#}", e);
            None
        }
    };
    logging::init(cli.verbose, log_file.as_deref())?;

    let mut config = ShellConfig::load_from(cli.config.as_deref())?;
    cli.apply_to(&mut config);
    config.validate()?;
    tracing::debug!("Effective config:\n{}", config.to_yaml()?);

    let binary = config::resolve_daemon_binary(cli.daemon.as_deref(), config.daemon.binary.as_deref())?;
    tracing::info!(binary = %binary.display(), version = VERSION, "syncbar starting");

    let broker = Arc::new(SessionBroker::new());
    broker.register(Arc::new(UrlAnnouncer::stdout()));

    let poller = if config.status.enabled {
        let poller = StatusPoller::new(
            broker.watch(),
            config.status.poll_interval(),
            config.status.timeout(),
        );
        Some(tokio::spawn(poller.run(|view| println!("[status] {}", view))))
    } else {
        None
    };

    let launcher = ProcessLauncher::new(binary, config.daemon.args.clone());
    let mut supervisor =
        ProcessSupervisor::new(launcher, config.supervisor_config(), broker.clone());

    let outcome = supervisor.run(shutdown_signal()).await;

    if let Some(poller) = poller {
        poller.abort();
    }

    match outcome? {
        SupervisorExit::DaemonRequested => {
            tracing::info!(restarts = supervisor.restarts(), "Daemon requested exit");
        }
        SupervisorExit::HostRequested => {
            tracing::info!(restarts = supervisor.restarts(), "Shut down");
        }
    }
    Ok(())
}
