// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local IPC surface, client half (C10, §4.10).
//!
//! The client daemon doesn't own routing or a client registry, so only
//! `Status` is meaningful here; `Switch`/`Release`/`Connect` are
//! server-only commands and get an `ErrorResponse` explaining as much —
//! see DESIGN.md for this scoping decision.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waymon_core::error::IpcErrorBody;
use waymon_core::ipc::protocol::{self, IpcRequest, IpcResponse, StatusResponse};

use crate::control::ControlStatus;

pub struct IpcServer {
    socket_path: PathBuf,
    status: Arc<ControlStatus>,
    server_addr: String,
    client_name: String,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf, status: Arc<ControlStatus>, server_addr: String, client_name: String) -> Self {
        Self { socket_path, status, server_addr, client_name }
    }

    pub async fn run(&self, cancel: CancellationToken) -> std::io::Result<()> {
        let _ = std::fs::remove_file(&self.socket_path);
        if let Some(parent) = self.socket_path.parent() {
            create_socket_dir(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        set_socket_mode(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "client IPC listener started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let status = Arc::clone(&self.status);
                            let server_addr = self.server_addr.clone();
                            let client_name = self.client_name.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, status, server_addr, client_name).await {
                                    debug!(error = %e, "client IPC connection ended with an error");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "client IPC accept failed"),
                    }
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);
        Ok(())
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    status: Arc<ControlStatus>,
    server_addr: String,
    client_name: String,
) -> Result<(), waymon_core::error::ProtocolError> {
    loop {
        let request: IpcRequest = match protocol::read_message(&mut stream).await {
            Ok(r) => r,
            Err(_) => return Ok(()),
        };
        let response = handle_request(request, &status, &server_addr, &client_name).await;
        protocol::write_message(&mut stream, &response).await?;
    }
}

async fn handle_request(
    request: IpcRequest,
    status: &ControlStatus,
    server_addr: &str,
    client_name: &str,
) -> IpcResponse {
    match request {
        IpcRequest::Status => {
            let controller = status.controller_name().await;
            IpcResponse::Status(StatusResponse {
                active: status.being_controlled(),
                connected: status.connected(),
                server_host: server_addr.to_string(),
                current_computer: controller.unwrap_or_else(|| client_name.to_string()),
                total_computers: 1,
                computer_names: vec![client_name.to_string()],
            })
        }
        IpcRequest::Switch { .. } | IpcRequest::Release | IpcRequest::Connect { .. } => {
            IpcResponse::Error(IpcErrorBody::new("routing commands are only served by the server daemon"))
        }
    }
}

#[cfg(unix)]
fn create_socket_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::create_dir_all(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn create_socket_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(unix)]
fn set_socket_mode(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_socket_mode(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
#[path = "ipc_tests.rs"]
mod tests;
