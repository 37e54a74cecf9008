use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_util::sync::CancellationToken;
use waymon_core::transport::session::TransportSession;

use super::*;

fn spawn_session() -> TransportSession {
    let (a, _b) = tokio::io::duplex(4096);
    let (session, _rx) = TransportSession::spawn(a, CancellationToken::new(), 64 * 1024);
    session
}

fn record(session_id: &str) -> ClientRecord {
    ClientRecord {
        session_id: session_id.to_string(),
        remote_addr: None,
        public_key_fingerprint: format!("SHA256:{session_id}"),
        session: spawn_session(),
        config: None,
        connected_at_ns: 0,
        status: ClientStatus::Idle,
    }
}

#[tokio::test]
async fn insert_and_lookup_round_trips() {
    let registry = ClientRegistry::new(2);
    registry.try_insert(record("a")).await.expect("insert");
    assert_eq!(registry.len().await, 1);
    let got = registry.get("a").await.expect("present");
    assert_eq!(got.session_id, "a");
}

#[tokio::test]
async fn rejects_insert_beyond_max_clients() {
    let registry = ClientRegistry::new(1);
    registry.try_insert(record("a")).await.expect("first insert");
    let err = registry.try_insert(record("b")).await.unwrap_err();
    assert_eq!(err, WaymonError::MaxClients);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let registry = ClientRegistry::new(2);
    registry.try_insert(record("a")).await.expect("insert");
    assert!(registry.remove("a").await);
    assert!(!registry.remove("a").await);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn callbacks_fire_without_holding_the_lock() {
    let registry = Arc::new(ClientRegistry::new(2));
    let connected = Arc::new(AtomicUsize::new(0));
    let disconnected = Arc::new(AtomicUsize::new(0));

    let c = Arc::clone(&connected);
    registry.set_on_connected(Arc::new(move |_, _| { c.fetch_add(1, Ordering::SeqCst); })).await;
    let d = Arc::clone(&disconnected);
    registry.set_on_disconnected(Arc::new(move |_, _| { d.fetch_add(1, Ordering::SeqCst); })).await;

    registry.try_insert(record("a")).await.expect("insert");
    assert_eq!(connected.load(Ordering::SeqCst), 1);

    registry.remove("a").await;
    assert_eq!(disconnected.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ordered_ids_follow_connection_timestamp() {
    let registry = ClientRegistry::new(3);
    let mut first = record("late");
    first.connected_at_ns = 200;
    let mut second = record("early");
    second.connected_at_ns = 100;
    registry.try_insert(first).await.expect("insert");
    registry.try_insert(second).await.expect("insert");

    assert_eq!(registry.ordered_ids().await, vec!["early".to_string(), "late".to_string()]);
}

#[tokio::test]
async fn set_status_and_config_mutate_in_place() {
    let registry = ClientRegistry::new(1);
    registry.try_insert(record("a")).await.expect("insert");
    registry.set_status("a", ClientStatus::BeingControlled).await;
    let got = registry.get("a").await.expect("present");
    assert_eq!(got.status, ClientStatus::BeingControlled);
}
