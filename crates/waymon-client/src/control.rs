// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control/session protocol, client half (C12, §4.12).
//!
//! Drains the `mpsc::Receiver<InputEvent>` handed back by a
//! [`TransportSession`](waymon_core::transport::session::TransportSession)
//! and applies control-plane transitions to [`ControlStatus`] and the
//! injection pipeline. Input variants are handed to the injector; `Log`
//! events are never expected server->client and are dropped with a warning
//! if one somehow arrives (§4.7).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use waymon_core::protocol::event::{ControlEvent, InputEvent, InputEventKind};

use crate::injector::{InjectionPipeline, Injector};

/// Client-side control state (§3 `ControlStatus`).
pub struct ControlStatus {
    being_controlled: AtomicBool,
    connected: AtomicBool,
    controller_name: RwLock<Option<String>>,
    connected_at_ns: AtomicI64,
}

impl ControlStatus {
    pub fn new() -> Self {
        Self {
            being_controlled: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            controller_name: RwLock::new(None),
            connected_at_ns: AtomicI64::new(waymon_core::time::monotonic_now_ns()),
        }
    }

    pub fn being_controlled(&self) -> bool {
        self.being_controlled.load(Ordering::SeqCst)
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub async fn controller_name(&self) -> Option<String> {
        self.controller_name.read().await.clone()
    }

    pub fn connected_at_ns(&self) -> i64 {
        self.connected_at_ns.load(Ordering::SeqCst)
    }

    /// Called when a session is established (first connect or every
    /// successful reconnect).
    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.connected_at_ns.store(waymon_core::time::monotonic_now_ns(), Ordering::SeqCst);
    }

    /// Called when the session ends, whether cleanly or via an error.
    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.being_controlled.store(false, Ordering::SeqCst);
    }
}

impl Default for ControlStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of draining the control loop, so the caller (the reconnection
/// manager) knows whether to reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The session closed (EOF or I/O error); reconnect normally.
    SessionClosed,
    /// The server sent `SERVER_SHUTDOWN`; reconnect without tearing down
    /// injector state (§4.12 step 6).
    ServerShutdown,
}

/// Drive one session's control-plane and input traffic until it ends.
pub async fn run<I: Injector>(
    client_id: &str,
    mut rx: mpsc::Receiver<InputEvent>,
    status: Arc<ControlStatus>,
    pipeline: Arc<InjectionPipeline<I>>,
    on_activity: impl Fn(),
) -> LoopExit {
    while let Some(event) = rx.recv().await {
        on_activity();
        match event.kind {
            InputEventKind::Control(ControlEvent::RequestControl { target_id }) => {
                if target_id == client_id {
                    status.being_controlled.store(true, Ordering::SeqCst);
                    *status.controller_name.write().await = Some(event.source_id.clone());
                    pipeline.set_being_controlled(true);
                    info!(controller = %event.source_id, "entered being-controlled state");
                } else {
                    warn!(target_id, client_id, "ignoring REQUEST_CONTROL addressed to another client");
                }
            }
            InputEventKind::Control(ControlEvent::ReleaseControl { .. }) => {
                status.being_controlled.store(false, Ordering::SeqCst);
                *status.controller_name.write().await = None;
                pipeline.set_being_controlled(false);
                info!("left being-controlled state");
            }
            InputEventKind::Control(ControlEvent::ServerShutdown) => {
                info!("server shutdown announced, entering reconnect loop");
                status.being_controlled.store(false, Ordering::SeqCst);
                *status.controller_name.write().await = None;
                pipeline.set_being_controlled(false);
                return LoopExit::ServerShutdown;
            }
            InputEventKind::Control(ControlEvent::ClientListResponse { client_ids }) => {
                info!(count = client_ids.len(), "received client list response");
            }
            InputEventKind::Control(
                ControlEvent::SwitchToLocal
                | ControlEvent::ClientListRequest
                | ControlEvent::ClientConfig(_)
                | ControlEvent::HealthPing
                | ControlEvent::HealthPong,
            ) => {
                warn!("ignoring server-originated control kind that a client should not receive");
            }
            InputEventKind::Log(_) => {
                warn!("dropping unexpected Log event received from the server");
            }
            input_kind => pipeline.dispatch(&input_kind),
        }
    }

    LoopExit::SessionClosed
}

#[cfg(test)]
#[path = "control_tests.rs"]
mod tests;
