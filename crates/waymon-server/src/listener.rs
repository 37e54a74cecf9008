// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection listener: accepts TCP connections, runs the auth handshake,
//! enforces the registry's capacity before handing the session off to the
//! steady-state control loop, and spawns the transport session + control
//! dispatch for every accepted client.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use waymon_core::auth::Auth;
use waymon_core::protocol::codec::MAX_CLIENTS_FATAL_TEXT;
use waymon_core::transport::channel::tune_tcp_stream;
use waymon_core::transport::handshake;
use waymon_core::transport::session::TransportSession;

use crate::control;
use crate::log_forward::LogSink;
use crate::registry::{ClientRecord, ClientRegistry, ClientStatus};
use crate::routing::Router;

/// Bind `listen_addr` and accept clients until `cancel` fires.
pub async fn run(
    listen_addr: &str,
    auth: Arc<Auth>,
    registry: Arc<ClientRegistry>,
    router: Arc<Router>,
    log_sink: Arc<LogSink>,
    batch_max_bytes: usize,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(listen_addr).await?;
    info!(addr = listen_addr, "server listening for client connections");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => { warn!(error = %e, "accept failed"); continue; }
                };
                tune_tcp_stream(&stream);

                let auth = Arc::clone(&auth);
                let registry = Arc::clone(&registry);
                let router = Arc::clone(&router);
                let log_sink = Arc::clone(&log_sink);
                tokio::spawn(async move {
                    accept_one(stream, addr, auth, registry, router, log_sink, batch_max_bytes).await;
                });
            }
        }
    }

    Ok(())
}

async fn accept_one(
    mut stream: tokio::net::TcpStream,
    addr: std::net::SocketAddr,
    auth: Arc<Auth>,
    registry: Arc<ClientRegistry>,
    router: Arc<Router>,
    log_sink: Arc<LogSink>,
    batch_max_bytes: usize,
) {
    let fingerprint = match handshake::server_handshake(&mut stream, &auth, addr).await {
        Ok(fp) => fp,
        Err(e) => {
            warn!(%addr, error = %e, "handshake rejected");
            return;
        }
    };

    // Checked before the stream is handed to the transport session, which
    // takes exclusive ownership of it: a client rejected here sees the
    // fatal-text sentinel on the wire instead of a frame (§4.4, §8
    // scenario 4). `try_insert` below still re-checks atomically, closing
    // the session without a courtesy message on the rare race where
    // capacity fills between this check and the insert.
    if registry.len().await >= registry.max_clients() {
        warn!(%addr, "rejecting connection: registry at max_clients");
        let _ = stream.write_all(format!("{MAX_CLIENTS_FATAL_TEXT}\n").as_bytes()).await;
        return;
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    let session_cancel = CancellationToken::new();
    let (session, mut rx) = TransportSession::spawn(stream, session_cancel, batch_max_bytes);

    let record = ClientRecord {
        session_id: session_id.clone(),
        remote_addr: Some(addr),
        public_key_fingerprint: fingerprint,
        session: session.clone(),
        config: None,
        connected_at_ns: waymon_core::time::monotonic_now_ns(),
        status: ClientStatus::Idle,
    };

    if registry.try_insert(record).await.is_err() {
        warn!(%addr, "rejecting connection: registry at max_clients");
        session.close();
        return;
    }

    if !control::await_initial_config(&session, &mut rx, &registry, &session_id).await {
        warn!(%addr, session_id = %session_id, "client did not announce CLIENT_CONFIG in time");
    }

    let hostname_hint = registry
        .get(&session_id)
        .await
        .and_then(|r| r.config)
        .map(|c| c.client_name)
        .unwrap_or_else(|| addr.to_string());

    control::run(session_id, hostname_hint, Some(addr), rx, registry, router, log_sink).await;
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
