// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One connection attempt: TCP connect, client-side auth handshake, and
//! the initial `CLIENT_CONFIG` announcement (§4.12 steps 1-3). Reused for
//! both the first connection and every reconnect attempt (§4.8).

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use waymon_core::identity::Identity;
use waymon_core::protocol::event::{ControlEvent, InputEvent, InputEventKind};
use waymon_core::transport::channel::tune_tcp_stream;
use waymon_core::transport::handshake;
use waymon_core::transport::session::TransportSession;

/// A client's self-reported configuration is re-sent on every successful
/// connect per §4.8.
const CLIENT_CONFIG_SEND_DEADLINE: Duration = Duration::from_secs(2);

pub async fn connect(
    server_addr: &str,
    identity: &Identity,
    client_config: waymon_core::protocol::event::ClientConfig,
    client_id: &str,
    batch_max_bytes: usize,
    cancel: CancellationToken,
) -> anyhow::Result<(TransportSession, tokio::sync::mpsc::Receiver<InputEvent>)> {
    let mut stream = TcpStream::connect(server_addr).await?;
    tune_tcp_stream(&stream);

    handshake::client_handshake(&mut stream, identity).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let (session, rx) = TransportSession::spawn(stream, cancel, batch_max_bytes);

    let announce = InputEvent::new(client_id, InputEventKind::Control(ControlEvent::ClientConfig(client_config)));
    tokio::time::timeout(CLIENT_CONFIG_SEND_DEADLINE, session.send(&announce))
        .await
        .map_err(|_| anyhow::anyhow!("timed out announcing CLIENT_CONFIG"))?
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok((session, rx))
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
