// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local IPC wire schema (C10, §4.10, §6).
//!
//! Framing mirrors the event codec (u32 BE length prefix) but the payload
//! is JSON — request volume is low (one-shot CLI commands) and the schema
//! is small enough that `serde_json` round-trips are simpler than hand
//! rolling another tagged-union encoder for it.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{IpcErrorBody, ProtocolError};

/// IPC messages are short CLI commands; this is generous enough that a
/// legitimate request can never be rejected while still bounding memory.
pub const MAX_IPC_MESSAGE_SIZE: u32 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchAction {
    Next,
    Previous,
    Enable,
    Disable,
}

/// CLI-originated request (§4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcRequest {
    Status,
    Switch { action: SwitchAction },
    Release,
    Connect { slot: u8 },
}

/// Server/client response to an [`IpcRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    Status(StatusResponse),
    Error(IpcErrorBody),
    Ok,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub active: bool,
    pub connected: bool,
    pub server_host: String,
    pub current_computer: String,
    pub total_computers: u32,
    pub computer_names: Vec<String>,
}

/// Write one length-prefixed JSON message.
pub async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if body.is_empty() || body.len() as u32 > MAX_IPC_MESSAGE_SIZE {
        return Err(ProtocolError::InvalidLength { declared: body.len() as u32 });
    }
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    Ok(())
}

/// Read one length-prefixed JSON message.
pub async fn read_message<T, R>(reader: &mut R) -> Result<T, ProtocolError>
where
    T: serde::de::DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let length = u32::from_be_bytes(len_bytes);
    if length == 0 || length > MAX_IPC_MESSAGE_SIZE {
        return Err(ProtocolError::InvalidLength { declared: length });
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Default IPC socket path for `user` (§6): `{tmp}/waymon-{user}.sock`.
pub fn socket_path(tmp_dir: &std::path::Path, user: &str) -> std::path::PathBuf {
    tmp_dir.join(format!("waymon-{user}.sock"))
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
