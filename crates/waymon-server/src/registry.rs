// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client registry (C4, §4.4): the server-side table of connected clients,
//! keyed by session id, enforcing the at-most-`max_clients` policy.
//!
//! Grounded on the teacher's `PodRegistry` (`broker/registry.rs`): a
//! `RwLock<HashMap<...>>` with a `register`/`deregister`/`list` surface and
//! connect/disconnect callbacks invoked outside the lock, generalized here
//! to a hard capacity cap and a `BeingControlled` status the pod registry
//! has no equivalent of.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use waymon_core::error::WaymonError;
use waymon_core::protocol::event::{ClientConfig, InputEvent};
use waymon_core::transport::session::TransportSession;

/// A client's current control status (§3 `ClientRecord.status`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Idle,
    BeingControlled,
    Disconnected,
}

/// Server-side record for one connected client (§3 `ClientRecord`).
///
/// Exclusively owned by [`ClientRegistry`]; the routing state machine
/// refers to clients by `session_id` and never holds this directly (§9
/// "ownership of `ClientRecord`").
#[derive(Clone)]
pub struct ClientRecord {
    pub session_id: String,
    pub remote_addr: Option<SocketAddr>,
    pub public_key_fingerprint: String,
    pub session: TransportSession,
    pub config: Option<ClientConfig>,
    pub connected_at_ns: i64,
    pub status: ClientStatus,
}

impl ClientRecord {
    pub fn accepts_input(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.capabilities.accepts_input())
    }
}

/// Serializable snapshot for the IPC status surface (§4.10).
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub session_id: String,
    pub client_name: String,
    pub status: ClientStatus,
    pub connected_at_ns: i64,
}

type ConnCallback = Arc<dyn Fn(Option<SocketAddr>, String) + Send + Sync>;

/// Concurrent map `session_id -> ClientRecord` (§4.4).
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientRecord>>,
    max_clients: usize,
    on_connected: RwLock<Option<ConnCallback>>,
    on_disconnected: RwLock<Option<ConnCallback>>,
}

impl ClientRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            max_clients,
            on_connected: RwLock::new(None),
            on_disconnected: RwLock::new(None),
        }
    }

    pub async fn set_on_connected(&self, cb: ConnCallback) {
        *self.on_connected.write().await = Some(cb);
    }

    pub async fn set_on_disconnected(&self, cb: ConnCallback) {
        *self.on_disconnected.write().await = Some(cb);
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Attempt to insert a newly-authenticated client. Rejects with
    /// `MaxClients` *before* the handshake completes its upgrade if the
    /// registry is already full (§4.4) — the caller must close the
    /// connection on this error without inserting anything.
    pub async fn try_insert(&self, record: ClientRecord) -> Result<(), WaymonError> {
        let mut clients = self.clients.write().await;
        if clients.len() >= self.max_clients {
            return Err(WaymonError::MaxClients);
        }
        let session_id = record.session_id.clone();
        let remote_addr = record.remote_addr;
        let fingerprint = record.public_key_fingerprint.clone();
        clients.insert(session_id, record);
        drop(clients);

        if let Some(cb) = self.on_connected.read().await.clone() {
            cb(remote_addr, fingerprint);
        }
        Ok(())
    }

    /// Remove a client, invoking `on_disconnected` outside the lock.
    /// Idempotent — removing an already-removed session returns `false`
    /// without side effects.
    pub async fn remove(&self, session_id: &str) -> bool {
        let removed = self.clients.write().await.remove(session_id);
        let Some(record) = removed else {
            return false;
        };
        if let Some(cb) = self.on_disconnected.read().await.clone() {
            cb(record.remote_addr, record.public_key_fingerprint);
        }
        true
    }

    pub async fn get(&self, session_id: &str) -> Option<ClientRecord> {
        self.clients.read().await.get(session_id).cloned()
    }

    pub async fn set_status(&self, session_id: &str, status: ClientStatus) {
        if let Some(record) = self.clients.write().await.get_mut(session_id) {
            record.status = status;
        }
    }

    pub async fn set_config(&self, session_id: &str, config: ClientConfig) {
        if let Some(record) = self.clients.write().await.get_mut(session_id) {
            record.config = Some(config);
        }
    }

    /// Client ids ordered by connection timestamp, for the switch cycle
    /// (§4.5). Disconnected entries can't appear — they're removed, not
    /// marked — so no further filtering is needed here.
    pub async fn ordered_ids(&self) -> Vec<String> {
        let clients = self.clients.read().await;
        let mut entries: Vec<&ClientRecord> = clients.values().collect();
        entries.sort_by_key(|r| r.connected_at_ns);
        entries.into_iter().map(|r| r.session_id.clone()).collect()
    }

    pub async fn snapshot(&self) -> Vec<ClientSnapshot> {
        let clients = self.clients.read().await;
        clients
            .values()
            .map(|r| ClientSnapshot {
                session_id: r.session_id.clone(),
                client_name: r.config.as_ref().map(|c| c.client_name.clone()).unwrap_or_default(),
                status: r.status,
                connected_at_ns: r.connected_at_ns,
            })
            .collect()
    }

    /// Broadcast `event` to every connected client. A per-client write
    /// failure is logged and surfaced in the returned list but does not
    /// abort the broadcast (§4.4).
    pub async fn send_to_all(&self, event: &InputEvent) -> Vec<(String, WaymonError)> {
        let snapshot: Vec<(String, TransportSession)> =
            self.clients.read().await.values().map(|r| (r.session_id.clone(), r.session.clone())).collect();

        let mut failures = Vec::new();
        for (session_id, session) in snapshot {
            if let Err(e) = session.send(event).await {
                warn!(session_id = %session_id, error = %e, "broadcast send failed");
                failures.push((session_id, e));
            }
        }
        failures
    }

    /// Close every connected client's session. Each session's own control
    /// loop notices the closed channel and removes itself from the
    /// registry, so this only needs to signal, not mutate the map (§9
    /// cancellation graph).
    pub async fn close_all(&self) {
        let sessions: Vec<TransportSession> = self.clients.read().await.values().map(|r| r.session.clone()).collect();
        for session in sessions {
            session.close();
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
