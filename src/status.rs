//! Status popup: periodic CPU/RAM readout from the daemon REST API.
//!
//! The poller never caches an endpoint. Every poll reads the latest session
//! snapshot, and a rebind triggers an immediate poll against the new address.

use crate::session_broker::Session;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

/// REST endpoint reporting process statistics.
pub const STATUS_PATH: &str = "/rest/system/status";

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "X-API-Key";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Subset of `/rest/system/status` the popup displays.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    /// CPU usage as a fraction (0.0 - 1.0).
    pub cpu_percent: f64,
    /// Allocated memory in bytes.
    pub alloc: u64,
}

impl SystemStatus {
    pub fn cpu_display_percent(&self) -> f64 {
        self.cpu_percent * 100.0
    }

    pub fn memory_megabytes(&self) -> f64 {
        self.alloc as f64 / 1e6
    }
}

/// What the popup currently shows.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusView {
    /// No session bound yet.
    Pending,
    Ready {
        status: SystemStatus,
        fetched_at: DateTime<Local>,
    },
    Failed(String),
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Waiting for daemon..."),
            Self::Ready { status, fetched_at } => write!(
                f,
                "CPU {:.1}% | RAM {:.1} MB ({})",
                status.cpu_display_percent(),
                status.memory_megabytes(),
                fetched_at.format("%H:%M:%S")
            ),
            Self::Failed(reason) => write!(f, "Status unavailable: {}", reason),
        }
    }
}

pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// Fetches `/rest/system/status` for the given session. Blocking.
pub fn fetch_status(agent: &ureq::Agent, session: &Session) -> Result<SystemStatus> {
    let body: String = agent
        .get(&session.endpoint.url(STATUS_PATH))
        .header(API_KEY_HEADER, session.credential.expose())
        .call()
        .context("Failed to fetch daemon status")?
        .body_mut()
        .read_to_string()
        .context("Failed to read status response")?;

    serde_json::from_str(&body).context("Failed to parse status response")
}

/// Polls the daemon on an interval and on every session change.
pub struct StatusPoller {
    agent: ureq::Agent,
    interval: Duration,
    session: watch::Receiver<Option<Session>>,
}

impl StatusPoller {
    pub fn new(
        session: watch::Receiver<Option<Session>>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: build_agent(timeout),
            interval,
            session,
        }
    }

    /// Polls once against the current snapshot.
    pub async fn poll_once(&self) -> StatusView {
        let snapshot = self.session.borrow().clone();
        let Some(session) = snapshot else {
            return StatusView::Pending;
        };

        let agent = self.agent.clone();
        match tokio::task::spawn_blocking(move || fetch_status(&agent, &session)).await {
            Ok(Ok(status)) => StatusView::Ready {
                status,
                fetched_at: Local::now(),
            },
            Ok(Err(e)) => {
                tracing::debug!("Status poll failed: {:#}", e);
                StatusView::Failed(format!("{:#}", e))
            }
            Err(e) => StatusView::Failed(e.to_string()),
        }
    }

    /// Runs until the session source goes away, handing each view to `render`.
    pub async fn run<F>(mut self, mut render: F)
    where
        F: FnMut(&StatusView),
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    ticker.reset();
                }
            }
            let view = self.poll_once().await;
            render(&view);
        }
    }
}

#[cfg(test)]
#[path = "tests/status_tests.rs"]
mod tests;
