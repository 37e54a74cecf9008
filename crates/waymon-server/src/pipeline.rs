// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event pipeline (C6, §4.6): captured input -> route -> deliver.
//!
//! OS-level capture is an external collaborator (§1 scope); [`CaptureSource`]
//! is the seam a platform-specific adapter plugs into, mirroring how
//! `waymon_core::transport::channel::DuplexChannel` is the seam the
//! transport generalizes over instead of hard-coding SSH.

use std::sync::Arc;

use tracing::warn;
use waymon_core::error::WaymonError;
use waymon_core::protocol::event::{InputEvent, InputEventKind};

use crate::registry::ClientRegistry;
use crate::routing::{Router, SwitchTarget};

/// Produces raw captured input kinds, unstamped and undestined. A real
/// implementation adapts a compositor's input-capture API; tests use a
/// channel-backed fake.
pub trait CaptureSource: Send {
    fn next_event(&mut self) -> impl std::future::Future<Output = Option<InputEventKind>> + Send;
}

/// Feeds a `mpsc::Receiver` as a [`CaptureSource`], for tests and for
/// adapters that already bridge onto a channel internally.
pub struct ChannelCapture(pub tokio::sync::mpsc::Receiver<InputEventKind>);

impl CaptureSource for ChannelCapture {
    async fn next_event(&mut self) -> Option<InputEventKind> {
        self.0.recv().await
    }
}

/// Stamps, routes, and delivers one captured event at a time (§4.6).
pub struct EventPipeline {
    router: Arc<Router>,
    registry: Arc<ClientRegistry>,
    server_id: String,
}

impl EventPipeline {
    pub fn new(router: Arc<Router>, registry: Arc<ClientRegistry>, server_id: impl Into<String>) -> Self {
        Self { router, registry, server_id: server_id.into() }
    }

    /// Run the pipeline until `source` is exhausted or `cancel` fires.
    pub async fn run(&self, mut source: impl CaptureSource, cancel: tokio_util::sync::CancellationToken) {
        loop {
            let kind = tokio::select! {
                _ = cancel.cancelled() => break,
                kind = source.next_event() => kind,
            };
            let Some(kind) = kind else { break };
            self.process(kind).await;
        }
    }

    /// Stamp and deliver a single captured event (§4.6 steps 1-4).
    pub async fn process(&self, kind: InputEventKind) {
        let event = InputEvent::new(&self.server_id, kind);

        let target = self.router.current().await;
        let SwitchTarget::Client(id) = target else {
            return; // Local: the physical device already handled it.
        };

        let Some(record) = self.registry.get(&id).await else {
            self.router.handle_disconnect(&id).await;
            return;
        };

        match record.session.send(&event).await {
            Ok(()) => {}
            Err(WaymonError::Backpressure) => {
                warn!(client_id = %id, "backpressure: dropped oldest pending pointer-motion event");
            }
            Err(e) => {
                warn!(client_id = %id, error = %e, "delivery failed, forcing release to local");
                self.registry.remove(&id).await;
                self.router.handle_disconnect(&id).await;
            }
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
