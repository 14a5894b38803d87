use super::*;
use std::net::SocketAddr;

#[derive(Default)]
struct RecordingConsumer {
    updates: Mutex<Vec<SessionUpdate>>,
}

impl RecordingConsumer {
    fn updates(&self) -> Vec<SessionUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl SessionConsumer for RecordingConsumer {
    fn session_bound(&self, session: &Session) {
        self.updates
            .lock()
            .unwrap()
            .push(SessionUpdate::Bound(session.clone()));
    }

    fn session_unbound(&self) {
        self.updates.lock().unwrap().push(SessionUpdate::Unbound);
    }
}

fn endpoint(addr: &str) -> Endpoint {
    Endpoint::new(addr.parse::<SocketAddr>().unwrap())
}

#[test]
fn test_starts_unbound() {
    let broker = SessionBroker::new();
    assert!(broker.current_session().is_none());
}

#[test]
fn test_bind_notifies_registered_consumers() {
    let broker = SessionBroker::new();
    let first = Arc::new(RecordingConsumer::default());
    let second = Arc::new(RecordingConsumer::default());
    broker.register(first.clone());
    broker.register(second.clone());

    let credential = Credential::from_raw("abc");
    broker.bind(endpoint("127.0.0.1:8384"), credential.clone());

    let expected = vec![SessionUpdate::Bound(Session::new(
        endpoint("127.0.0.1:8384"),
        credential,
    ))];
    assert_eq!(first.updates(), expected);
    assert_eq!(second.updates(), expected);
}

#[test]
fn test_bind_without_consumers_is_silent() {
    let broker = SessionBroker::new();
    broker.bind(endpoint("127.0.0.1:8384"), Credential::from_raw("abc"));
    assert_eq!(
        broker.current_session().map(|s| s.endpoint),
        Some(endpoint("127.0.0.1:8384"))
    );
}

#[test]
fn test_late_registration_delivers_exactly_once() {
    let broker = SessionBroker::new();
    let credential = Credential::from_raw("abc");
    broker.bind(endpoint("127.0.0.1:8384"), credential.clone());

    let consumer = Arc::new(RecordingConsumer::default());
    broker.register(consumer.clone());
    assert_eq!(consumer.updates().len(), 1);

    // Same values again: no duplicate delivery.
    broker.bind(endpoint("127.0.0.1:8384"), credential.clone());
    assert_eq!(
        consumer.updates(),
        vec![SessionUpdate::Bound(Session::new(
            endpoint("127.0.0.1:8384"),
            credential
        ))]
    );
}

#[test]
fn test_rebind_replaces_whole_session() {
    let broker = SessionBroker::new();
    let consumer = Arc::new(RecordingConsumer::default());
    broker.register(consumer.clone());
    let credential = Credential::from_raw("abc");

    broker.bind(endpoint("127.0.0.1:8384"), credential.clone());
    broker.bind(endpoint("127.0.0.1:9000"), credential.clone());

    assert_eq!(
        broker.current_session(),
        Some(Session::new(endpoint("127.0.0.1:9000"), credential))
    );
    assert_eq!(consumer.updates().len(), 2);
}

#[test]
fn test_unbind_notifies_once() {
    let broker = SessionBroker::new();
    let consumer = Arc::new(RecordingConsumer::default());
    broker.register(consumer.clone());

    broker.unbind();
    assert!(consumer.updates().is_empty());

    broker.bind(endpoint("127.0.0.1:8384"), Credential::from_raw("abc"));
    broker.unbind();
    broker.unbind();

    let updates = consumer.updates();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[1], SessionUpdate::Unbound);
    assert!(broker.current_session().is_none());
}

#[test]
fn test_unbind_then_same_bind_notifies_again() {
    let broker = SessionBroker::new();
    let consumer = Arc::new(RecordingConsumer::default());
    broker.register(consumer.clone());
    let credential = Credential::from_raw("abc");

    broker.bind(endpoint("127.0.0.1:8384"), credential.clone());
    broker.unbind();
    broker.bind(endpoint("127.0.0.1:8384"), credential);

    assert_eq!(consumer.updates().len(), 3);
}

#[tokio::test]
async fn test_channel_consumer_receives_updates_in_order() {
    let broker = SessionBroker::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    broker.register(Arc::new(tx));
    let credential = Credential::from_raw("abc");

    broker.bind(endpoint("127.0.0.1:1"), credential.clone());
    broker.unbind();
    broker.bind(endpoint("[::1]:2"), credential.clone());

    assert_eq!(
        rx.recv().await,
        Some(SessionUpdate::Bound(Session::new(
            endpoint("127.0.0.1:1"),
            credential.clone()
        )))
    );
    assert_eq!(rx.recv().await, Some(SessionUpdate::Unbound));
    assert_eq!(
        rx.recv().await,
        Some(SessionUpdate::Bound(Session::new(endpoint("[::1]:2"), credential)))
    );
}

#[test]
fn test_watch_reflects_latest_snapshot() {
    let broker = SessionBroker::new();
    let credential = Credential::from_raw("abc");
    broker.bind(endpoint("127.0.0.1:8384"), credential.clone());

    let rx = broker.watch();
    assert_eq!(
        rx.borrow().clone(),
        Some(Session::new(endpoint("127.0.0.1:8384"), credential))
    );

    broker.unbind();
    assert!(rx.borrow().is_none());
}
