//! Main window hand-off: tells the user where the daemon UI lives.

use crate::session_broker::{Session, SessionConsumer};
use std::io::Write;
use std::sync::Mutex;

/// Announces the daemon UI URL on every bind.
///
/// Only the endpoint is written; the credential stays with the broker.
pub struct UrlAnnouncer<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> UrlAnnouncer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn write_line(&self, line: &str) {
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl UrlAnnouncer<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> SessionConsumer for UrlAnnouncer<W> {
    fn session_bound(&self, session: &Session) {
        let url = session.endpoint.base_url();
        tracing::info!(%url, "Daemon UI available");
        self.write_line(&format!("Syncthing UI: {}", url));
    }

    fn session_unbound(&self) {
        tracing::debug!("Daemon UI unavailable");
        self.write_line("Syncthing UI: unavailable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use crate::endpoint::Endpoint;
    use crate::session_broker::SessionBroker;
    use std::sync::Arc;

    #[test]
    fn test_announces_url_without_credential() {
        let announcer = UrlAnnouncer::new(Vec::new());
        let endpoint = Endpoint::new("127.0.0.1:8384".parse().unwrap());
        let session = Session::new(endpoint, Credential::from_raw("topsecretkey"));

        announcer.session_bound(&session);
        announcer.session_unbound();

        let text = String::from_utf8(announcer.into_inner()).unwrap();
        assert_eq!(
            text,
            "Syncthing UI: http://127.0.0.1:8384/\nSyncthing UI: unavailable\n"
        );
        assert!(!text.contains("topsecretkey"));
    }

    #[test]
    fn test_registered_announcer_sees_every_rebind() {
        let broker = SessionBroker::new();
        let announcer = Arc::new(UrlAnnouncer::new(Vec::new()));
        broker.register(announcer.clone());

        let key = Credential::from_raw("k");
        broker.bind(Endpoint::new("127.0.0.1:1000".parse().unwrap()), key.clone());
        broker.unbind();
        broker.bind(Endpoint::new("[::1]:2000".parse().unwrap()), key);
        drop(broker);

        let announcer = Arc::try_unwrap(announcer).ok().unwrap();
        let text = String::from_utf8(announcer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Syncthing UI: http://127.0.0.1:1000/",
                "Syncthing UI: unavailable",
                "Syncthing UI: http://[::1]:2000/",
            ]
        );
    }
}
