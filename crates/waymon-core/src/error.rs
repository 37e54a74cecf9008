// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by the frame codec, transport session, auth
//! handshake, and IPC surfaces.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors raised while decoding a frame from the wire (C1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The declared frame length was `0` or exceeded `MAX_FRAME_SIZE`.
    InvalidLength { declared: u32 },
    /// The frame body did not decode into a known `InputEvent` variant.
    UnknownVariant { tag: u8 },
    /// The frame body was truncated or malformed for its declared variant.
    Malformed(String),
    /// The underlying byte source/sink returned an I/O error.
    Io(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { declared } => {
                write!(f, "invalid frame length: {declared}")
            }
            Self::UnknownVariant { tag } => write!(f, "unknown event variant tag: {tag}"),
            Self::Malformed(detail) => write!(f, "malformed frame: {detail}"),
            Self::Io(detail) => write!(f, "io error: {detail}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Top-level error codes for session and registry failures (§7 taxonomy).
///
/// Each variant carries no payload; call sites attach context via `tracing`
/// fields or an accompanying message, the way `MuxError`/`ErrorCode` do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaymonError {
    /// Connection rejected: presented key fingerprint not on the whitelist
    /// and the approval callback returned `false` or never answered.
    AuthRejected,
    /// The auth prompt did not resolve within the configured timeout.
    AuthTimeout,
    /// The registry was already at `max_clients` when the session attempted
    /// to complete its handshake.
    MaxClients,
    /// A read or write on the transport failed; the session is torn down.
    TransportIo,
    /// The client process has no usable injector backend at startup.
    BackendUnavailable,
    /// `switch_to(id)` named a client that is not connected or cannot
    /// accept input.
    TargetUnavailable,
    /// The buffered writer could not flush in time and dropped events.
    Backpressure,
}

impl WaymonError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthRejected => "AUTH_REJECTED",
            Self::AuthTimeout => "AUTH_TIMEOUT",
            Self::MaxClients => "MAX_CLIENTS",
            Self::TransportIo => "TRANSPORT_IO",
            Self::BackendUnavailable => "BACKEND_UNAVAILABLE",
            Self::TargetUnavailable => "TARGET_UNAVAILABLE",
            Self::Backpressure => "BACKPRESSURE",
        }
    }
}

impl fmt::Display for WaymonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for WaymonError {}

/// Error body returned over the local IPC surface (§4.10 `ErrorResponse`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcErrorBody {
    pub message: String,
}

impl IpcErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}
