// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing / target state machine (C5, §4.5): which destination — local or
//! one connected client — currently receives captured input.
//!
//! Grounded on the teacher's `Multiplexer` (`broker/mux.rs`) for the
//! shape of a single `Arc`-held coordinator wrapping a short-held lock
//! around one piece of switchable state, generalized here to the spec's
//! switch/release/disconnect transition table instead of pod stream
//! reconciliation.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use waymon_core::error::WaymonError;
use waymon_core::protocol::event::{ControlEvent, InputEvent, InputEventKind};

use crate::registry::{ClientRegistry, ClientStatus};

/// The current destination for captured input (§3 `SwitchTarget`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchTarget {
    Local,
    Client(String),
}

/// Owns the single `SwitchTarget` and performs every transition under its
/// short-held lock (§4.5, §5). The registry is looked up by id on each
/// transition rather than held directly, per §9's ownership rule.
pub struct Router {
    target: Mutex<SwitchTarget>,
    registry: Arc<ClientRegistry>,
    server_id: String,
}

impl Router {
    pub fn new(registry: Arc<ClientRegistry>, server_id: impl Into<String>) -> Self {
        Self { target: Mutex::new(SwitchTarget::Local), registry, server_id: server_id.into() }
    }

    pub async fn current(&self) -> SwitchTarget {
        self.target.lock().await.clone()
    }

    /// Advance to the next entry in `[Local, client_1, ..., client_k]`,
    /// ordered by connection timestamp (§4.5).
    pub async fn switch_next(&self) -> Result<SwitchTarget, WaymonError> {
        let cycle = self.cycle().await;
        let mut guard = self.target.lock().await;
        let idx = cycle.iter().position(|t| *t == *guard).unwrap_or(0);
        let next = cycle[(idx + 1) % cycle.len()].clone();
        self.transition(&mut guard, next).await
    }

    pub async fn switch_prev(&self) -> Result<SwitchTarget, WaymonError> {
        let cycle = self.cycle().await;
        let mut guard = self.target.lock().await;
        let idx = cycle.iter().position(|t| *t == *guard).unwrap_or(0);
        let prev = cycle[(idx + cycle.len() - 1) % cycle.len()].clone();
        self.transition(&mut guard, prev).await
    }

    /// Jump directly to `id`. `TargetUnavailable` if `id` isn't connected
    /// or can't accept input (§4.5).
    pub async fn switch_to(&self, id: &str) -> Result<SwitchTarget, WaymonError> {
        let record = self.registry.get(id).await.ok_or(WaymonError::TargetUnavailable)?;
        if !record.accepts_input() {
            return Err(WaymonError::TargetUnavailable);
        }
        let mut guard = self.target.lock().await;
        self.transition(&mut guard, SwitchTarget::Client(id.to_string())).await
    }

    pub async fn release(&self) -> Result<SwitchTarget, WaymonError> {
        let mut guard = self.target.lock().await;
        self.transition(&mut guard, SwitchTarget::Local).await
    }

    /// A currently-targeted client disconnected: force the target back to
    /// `Local` without attempting to notify the now-gone client (§4.5).
    pub async fn handle_disconnect(&self, id: &str) {
        let mut guard = self.target.lock().await;
        if *guard == SwitchTarget::Client(id.to_string()) {
            info!(client_id = id, "targeted client disconnected, releasing to local");
            *guard = SwitchTarget::Local;
        }
    }

    async fn cycle(&self) -> Vec<SwitchTarget> {
        let mut cycle = vec![SwitchTarget::Local];
        cycle.extend(self.registry.ordered_ids().await.into_iter().map(SwitchTarget::Client));
        cycle
    }

    /// Perform the full transition protocol (§4.5 steps 1-3) and update
    /// `*guard` only once every side effect has been attempted.
    async fn transition(
        &self,
        guard: &mut SwitchTarget,
        new_target: SwitchTarget,
    ) -> Result<SwitchTarget, WaymonError> {
        if *guard == new_target {
            return Ok(new_target);
        }

        if let SwitchTarget::Client(old_id) = guard.clone() {
            self.send_best_effort(&old_id, ControlEvent::ReleaseControl { target_id: old_id.clone() }).await;
            self.registry.set_status(&old_id, ClientStatus::Idle).await;
        }

        if let SwitchTarget::Client(new_id) = &new_target {
            self.send_best_effort(new_id, ControlEvent::RequestControl { target_id: new_id.clone() }).await;
            self.registry.set_status(new_id, ClientStatus::BeingControlled).await;
        }

        *guard = new_target.clone();
        Ok(new_target)
    }

    async fn send_best_effort(&self, client_id: &str, ctrl: ControlEvent) {
        let Some(record) = self.registry.get(client_id).await else {
            return;
        };
        let event = InputEvent::new(&self.server_id, InputEventKind::Control(ctrl));
        if let Err(e) = record.session.send(&event).await {
            warn!(client_id, error = %e, "best-effort control send failed");
        }
    }
}

#[cfg(test)]
#[path = "routing_tests.rs"]
mod tests;
