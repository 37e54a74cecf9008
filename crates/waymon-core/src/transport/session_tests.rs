use std::time::Duration;

use tokio::io::{duplex, AsyncWriteExt};

use super::*;
use crate::protocol::codec::{read_frame, write_frame};

const TEST_BATCH_MAX: usize = 64 * 1024;

#[tokio::test]
async fn sent_event_is_observed_on_the_peer_side() {
    let (local, mut peer) = duplex(8192);
    let cancel = CancellationToken::new();
    let (session, _rx) = TransportSession::spawn(local, cancel.clone(), TEST_BATCH_MAX);

    let event = InputEvent::new("server", InputEventKind::MouseMove { dx: 1.0, dy: 2.0 });
    session.send(&event).await.expect("send should succeed");

    match read_frame(&mut peer).await.expect("peer reads a frame") {
        ReadOutcome::Event(decoded) => assert_eq!(decoded, event),
        other => panic!("unexpected outcome: {other:?}"),
    }

    cancel.cancel();
}

#[tokio::test]
async fn health_ping_from_peer_is_answered_without_reaching_the_event_channel() {
    let (local, mut peer) = duplex(8192);
    let cancel = CancellationToken::new();
    let (session, mut rx) = TransportSession::spawn(local, cancel.clone(), TEST_BATCH_MAX);

    let ping = InputEvent::new("peer", InputEventKind::Control(ControlEvent::HealthPing));
    write_frame(&mut peer, &ping).await.expect("write ping");

    match tokio::time::timeout(Duration::from_secs(1), read_frame(&mut peer))
        .await
        .expect("should respond before timeout")
        .expect("read pong frame")
    {
        ReadOutcome::Event(event) => {
            assert_eq!(event.kind, InputEventKind::Control(ControlEvent::HealthPong));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    // The ping must not have been forwarded to the application channel.
    let nothing_forwarded =
        tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(nothing_forwarded.is_err(), "health ping leaked into the inbound event stream");

    session.close();
}

#[tokio::test]
async fn application_events_are_forwarded_to_the_owner() {
    let (local, mut peer) = duplex(8192);
    let cancel = CancellationToken::new();
    let (_session, mut rx) = TransportSession::spawn(local, cancel.clone(), TEST_BATCH_MAX);

    let switch = InputEvent::new("peer", InputEventKind::Control(ControlEvent::SwitchToLocal));
    write_frame(&mut peer, &switch).await.expect("write control event");

    let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("should arrive before timeout")
        .expect("channel open");
    assert_eq!(received.kind, InputEventKind::Control(ControlEvent::SwitchToLocal));

    cancel.cancel();
}

#[tokio::test]
async fn fatal_text_marker_closes_the_session_with_max_clients() {
    let (local, mut peer) = duplex(8192);
    let cancel = CancellationToken::new();
    let (session, mut rx) = TransportSession::spawn(local, cancel, TEST_BATCH_MAX);

    peer.write_all(b"error: maximum number of active clients\n").await.expect("write raw text");

    // The read loop should close and drop the event sender.
    let ended = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert_eq!(ended.expect("loop should terminate"), None);

    assert!(session.is_closed());
    assert_eq!(session.last_error().await, Some(WaymonError::MaxClients));
}

#[tokio::test]
async fn closing_the_session_stops_background_tasks() {
    let (local, _peer) = duplex(8192);
    let cancel = CancellationToken::new();
    let (session, mut rx) = TransportSession::spawn(local, cancel, TEST_BATCH_MAX);

    session.close();
    assert!(session.is_closed());

    let ended = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert_eq!(ended.expect("loop should terminate"), None);
}
