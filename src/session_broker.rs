//! Holder of the currently valid daemon session.
//!
//! The broker owns the single `(Endpoint, Credential)` pair and fans bind and
//! unbind notifications out to registered consumers. It is shared through an
//! `Arc` handed to every consumer at construction rather than a global.

use crate::credential::Credential;
use crate::endpoint::Endpoint;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

/// The endpoint/credential pair authenticating calls against the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub endpoint: Endpoint,
    pub credential: Credential,
}

impl Session {
    pub fn new(endpoint: Endpoint, credential: Credential) -> Self {
        Self {
            endpoint,
            credential,
        }
    }
}

/// Receiver of session changes.
///
/// Called synchronously while the broker's lock is held, so implementations
/// must be quick and must not call back into the broker.
pub trait SessionConsumer: Send + Sync {
    fn session_bound(&self, session: &Session);

    fn session_unbound(&self) {}
}

/// Change notification for channel-based consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    Bound(Session),
    Unbound,
}

impl SessionConsumer for mpsc::UnboundedSender<SessionUpdate> {
    fn session_bound(&self, session: &Session) {
        let _ = self.send(SessionUpdate::Bound(session.clone()));
    }

    fn session_unbound(&self) {
        let _ = self.send(SessionUpdate::Unbound);
    }
}

/// Latest-value consumer: receivers always see the most recent snapshot.
impl SessionConsumer for watch::Sender<Option<Session>> {
    fn session_bound(&self, session: &Session) {
        self.send_replace(Some(session.clone()));
    }

    fn session_unbound(&self) {
        self.send_replace(None);
    }
}

#[derive(Default)]
struct BrokerState {
    session: Option<Session>,
    consumers: Vec<Arc<dyn SessionConsumer>>,
}

/// Process-wide session state with ordered consumer notification.
#[derive(Default)]
pub struct SessionBroker {
    state: Mutex<BrokerState>,
}

impl SessionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    // Poison is ignored; the state is never left half-written.
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets or replaces the session and notifies every registered consumer.
    ///
    /// Rebinding the value that is already current notifies nobody.
    pub fn bind(&self, endpoint: Endpoint, credential: Credential) {
        let session = Session::new(endpoint, credential);
        let mut state = self.lock();
        if state.session.as_ref() == Some(&session) {
            return;
        }
        tracing::info!(endpoint = %session.endpoint, "Session bound");
        for consumer in &state.consumers {
            consumer.session_bound(&session);
        }
        state.session = Some(session);
    }

    /// Clears the session, e.g. while a crashed daemon is being relaunched.
    pub fn unbind(&self) {
        let mut state = self.lock();
        if state.session.take().is_none() {
            return;
        }
        tracing::info!("Session unbound");
        for consumer in &state.consumers {
            consumer.session_unbound();
        }
    }

    /// Adds a consumer, delivering the current session immediately if bound.
    pub fn register(&self, consumer: Arc<dyn SessionConsumer>) {
        let mut state = self.lock();
        if let Some(session) = &state.session {
            consumer.session_bound(session);
        }
        state.consumers.push(consumer);
    }

    /// Convenience for consumers that only care about the latest snapshot.
    pub fn watch(&self) -> watch::Receiver<Option<Session>> {
        let (tx, rx) = watch::channel(None);
        self.register(Arc::new(tx));
        rx
    }

    /// Snapshot of the current session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.lock().session.clone()
    }
}

#[cfg(test)]
#[path = "tests/session_broker_tests.rs"]
mod tests;
