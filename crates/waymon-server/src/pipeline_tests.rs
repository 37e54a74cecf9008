use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use waymon_core::protocol::codec;
use waymon_core::protocol::event::{ClientCapabilities, ClientConfig};
use waymon_core::transport::session::TransportSession;

use super::*;
use crate::registry::{ClientRecord, ClientStatus};

async fn insert_with_server_half(registry: &ClientRegistry, id: &str) -> tokio::io::DuplexStream {
    let (server_half, client_half) = tokio::io::duplex(65536);
    let (session, _rx) = TransportSession::spawn(server_half, CancellationToken::new(), 64 * 1024);
    registry
        .try_insert(ClientRecord {
            session_id: id.to_string(),
            remote_addr: None,
            public_key_fingerprint: format!("SHA256:{id}"),
            session,
            config: Some(ClientConfig {
                client_id: id.to_string(),
                client_name: id.to_string(),
                monitors: vec![],
                capabilities: ClientCapabilities { keyboard: true, mouse: true, scroll: true },
                compositor: "sway".into(),
                injector_version: "1".into(),
                keyboard_layout: "us".into(),
            }),
            connected_at_ns: 0,
            status: ClientStatus::Idle,
        })
        .await
        .expect("insert");
    client_half
}

#[tokio::test]
async fn events_are_dropped_while_local() {
    let registry = Arc::new(ClientRegistry::new(5));
    let router = Arc::new(Router::new(Arc::clone(&registry), "server"));
    let pipeline = EventPipeline::new(Arc::clone(&router), Arc::clone(&registry), "server");

    let mut client_half = insert_with_server_half(&registry, "a").await;
    pipeline.process(InputEventKind::MouseMove { dx: 1.0, dy: 1.0 }).await;

    // Nothing should have been written; confirm by racing a short read timeout.
    let mut buf = [0u8; 4];
    let result = tokio::time::timeout(std::time::Duration::from_millis(50), client_half.read_exact(&mut buf)).await;
    assert!(result.is_err(), "expected no bytes to be delivered while target is Local");
}

#[tokio::test]
async fn events_are_delivered_to_the_active_target() {
    let registry = Arc::new(ClientRegistry::new(5));
    let router = Arc::new(Router::new(Arc::clone(&registry), "server"));
    let pipeline = EventPipeline::new(Arc::clone(&router), Arc::clone(&registry), "server");

    let mut client_half = insert_with_server_half(&registry, "a").await;
    router.switch_to("a").await.expect("switch");

    pipeline.process(InputEventKind::MouseMove { dx: 2.0, dy: 3.0 }).await;

    let mut len_bytes = [0u8; 4];
    client_half.read_exact(&mut len_bytes).await.expect("read length");
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut body = vec![0u8; len];
    client_half.read_exact(&mut body).await.expect("read body");
    let event = codec::decode_event(bytes::Bytes::from(body)).expect("decode");
    assert_eq!(event.kind, InputEventKind::MouseMove { dx: 2.0, dy: 3.0 });
}

#[tokio::test]
async fn backpressure_drops_oldest_motion_without_disconnecting() {
    let registry = Arc::new(ClientRegistry::new(5));
    let router = Arc::new(Router::new(Arc::clone(&registry), "server"));
    let pipeline = EventPipeline::new(Arc::clone(&router), Arc::clone(&registry), "server");

    let mut client_half = insert_with_server_half(&registry, "a").await;
    router.switch_to("a").await.expect("switch");

    // Neither call suspends on the registry/router locks, so the flusher
    // never gets scheduled between them: the second motion event finds the
    // first still sitting unflushed and replaces it.
    pipeline.process(InputEventKind::MouseMove { dx: 1.0, dy: 1.0 }).await;
    pipeline.process(InputEventKind::MouseMove { dx: 2.0, dy: 2.0 }).await;

    assert!(registry.get("a").await.is_some(), "backpressure must not force a disconnect");

    let mut len_bytes = [0u8; 4];
    client_half.read_exact(&mut len_bytes).await.expect("read length");
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut body = vec![0u8; len];
    client_half.read_exact(&mut body).await.expect("read body");
    let event = codec::decode_event(bytes::Bytes::from(body)).expect("decode");
    assert_eq!(event.kind, InputEventKind::MouseMove { dx: 2.0, dy: 2.0 }, "only the newest motion event survives");
}

#[tokio::test]
async fn run_processes_events_from_a_capture_source_until_cancelled() {
    let registry = Arc::new(ClientRegistry::new(5));
    let router = Arc::new(Router::new(Arc::clone(&registry), "server"));
    let pipeline = EventPipeline::new(Arc::clone(&router), Arc::clone(&registry), "server");

    let (tx, rx) = tokio::sync::mpsc::channel(4);
    let cancel = CancellationToken::new();
    let source = ChannelCapture(rx);

    let cancel_clone = cancel.clone();
    let handle = tokio::spawn(async move { pipeline.run(source, cancel_clone).await });

    tx.send(InputEventKind::MouseMove { dx: 1.0, dy: 1.0 }).await.expect("send");
    cancel.cancel();
    handle.await.expect("join");
}
