// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duplex channel abstraction (§6).
//!
//! The spec's transport is "an authenticated, bidirectional byte-stream
//! channel with public-key auth over a single session id... in practice an
//! SSH session where stdin/stdout are used as the binary duplex channel".
//! Spawning and authenticating an actual SSH subprocess is the province of
//! the CLI front-end this crate doesn't own; [`TransportSession`] is generic
//! over anything that reads and writes bytes, and `tcp` below supplies the
//! concrete channel this workspace tests against.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Anything `TransportSession` can run its read/write loops over.
pub trait DuplexChannel: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DuplexChannel for T {}

const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);
const MIN_SEND_BUFFER: usize = 64 * 1024;

/// Apply the TCP tuning §4.2 prescribes at session establishment: disable
/// Nagle, enable keepalive, and ensure a send buffer of at least 64 KiB.
/// Best-effort — a tuning failure is logged, never fatal to the session.
pub fn tune_tcp_stream(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(error = %e, "failed to disable Nagle's algorithm");
    }

    let socket = socket2::SockRef::from(stream);
    let keepalive = socket2::TcpKeepalive::new().with_time(KEEPALIVE_PERIOD);
    if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
        tracing::warn!(error = %e, "failed to enable TCP keepalive");
    }

    match socket.send_buffer_size() {
        Ok(current) if current >= MIN_SEND_BUFFER => {}
        _ => {
            if let Err(e) = socket.set_send_buffer_size(MIN_SEND_BUFFER) {
                tracing::warn!(error = %e, "failed to grow TCP send buffer");
            }
        }
    }
}

/// Peer address of a duplex channel, when the underlying transport has one.
/// SSH-stdio channels (the production transport) have none; callers treat
/// `None` as "local/unknown peer" rather than an error.
pub trait PeerAddr {
    fn peer_addr(&self) -> Option<SocketAddr>;
}

impl PeerAddr for TcpStream {
    fn peer_addr(&self) -> Option<SocketAddr> {
        TcpStream::peer_addr(self).ok()
    }
}
