// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control/session protocol, server half (C12, §4.12).
//!
//! Drains the `mpsc::Receiver<InputEvent>` a [`TransportSession`] hands
//! back on `spawn` and dispatches by variant. `HealthPing`/`HealthPong`
//! never reach here — the transport layer answers those internally
//! (§4.2) — so this module only sees the control taxonomy the protocol
//! defines above the health-check layer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::warn;
use waymon_core::protocol::event::{ControlEvent, InputEvent, InputEventKind};
use waymon_core::transport::session::TransportSession;

use crate::log_forward::LogSink;
use crate::registry::ClientRegistry;
use crate::routing::Router;

/// A client must announce its `CLIENT_CONFIG` within this window of
/// connecting (§4.12 step 3); the listener enforces it before handing the
/// session off to the steady-state control loop.
pub const CLIENT_CONFIG_DEADLINE: Duration = Duration::from_secs(2);

/// Drive one client's control-plane traffic until the session closes.
pub async fn run(
    session_id: String,
    hostname_hint: String,
    remote_addr: Option<std::net::SocketAddr>,
    mut rx: mpsc::Receiver<InputEvent>,
    registry: Arc<ClientRegistry>,
    router: Arc<Router>,
    log_sink: Arc<LogSink>,
) {
    while let Some(event) = rx.recv().await {
        match event.kind {
            InputEventKind::Control(ControlEvent::ClientConfig(cfg)) => {
                registry.set_config(&session_id, cfg).await;
            }
            InputEventKind::Control(ControlEvent::ClientListRequest) => {
                let ids = registry.ordered_ids().await;
                if let Some(record) = registry.get(&session_id).await {
                    let reply = InputEvent::new(
                        &session_id,
                        InputEventKind::Control(ControlEvent::ClientListResponse { client_ids: ids }),
                    );
                    let _ = record.session.send(&reply).await;
                }
            }
            InputEventKind::Control(ControlEvent::SwitchToLocal) => {
                let _ = router.release().await;
            }
            InputEventKind::Log(log_event) => {
                if let Err(e) = log_sink.handle(&hostname_hint, remote_addr, &log_event).await {
                    warn!(session_id = %session_id, error = %e, "failed to forward client log line");
                }
            }
            InputEventKind::Control(ControlEvent::RequestControl { .. })
            | InputEventKind::Control(ControlEvent::ReleaseControl { .. })
            | InputEventKind::Control(ControlEvent::ServerShutdown)
            | InputEventKind::Control(ControlEvent::HealthPing)
            | InputEventKind::Control(ControlEvent::HealthPong) => {
                warn!(session_id = %session_id, "ignoring server-originated control kind received from a client");
            }
            other => {
                warn!(session_id = %session_id, kind = ?other, "unexpected input event from client, dropping");
            }
        }
    }

    router.handle_disconnect(&session_id).await;
    registry.remove(&session_id).await;
}

/// Wait for the client's first `CLIENT_CONFIG` announcement, enforcing
/// §4.12 step 3's 2-second deadline. Returns the event receiver untouched
/// so `run` above can continue draining it afterward — the config itself
/// is applied through `registry.set_config` exactly as any later
/// re-announcement would be.
pub async fn await_initial_config(
    session: &TransportSession,
    rx: &mut mpsc::Receiver<InputEvent>,
    registry: &ClientRegistry,
    session_id: &str,
) -> bool {
    let deadline = tokio::time::sleep(CLIENT_CONFIG_DEADLINE);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return false,
            maybe_event = rx.recv() => {
                let Some(event) = maybe_event else { return false };
                if let InputEventKind::Control(ControlEvent::ClientConfig(cfg)) = event.kind {
                    registry.set_config(session_id, cfg).await;
                    return true;
                }
                if session.is_closed() {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
