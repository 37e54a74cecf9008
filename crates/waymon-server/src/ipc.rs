// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local IPC surface, server half (C10, §4.10).
//!
//! One Unix-domain socket, mode 0600, accepting short-lived connections
//! that carry a request/response pair — grounded on the teacher's
//! `ipc_server` idiom (`UnixListener::bind` + per-connection task +
//! length-prefixed messages), generalized from newline-delimited JSON to
//! the shared `waymon_core::ipc::protocol` length-prefixed framing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use waymon_core::error::IpcErrorBody;
use waymon_core::ipc::protocol::{self, IpcRequest, IpcResponse, StatusResponse, SwitchAction};

use crate::registry::ClientRegistry;
use crate::routing::{Router, SwitchTarget};

pub struct IpcServer {
    socket_path: PathBuf,
    registry: Arc<ClientRegistry>,
    router: Arc<Router>,
    server_host: String,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf, registry: Arc<ClientRegistry>, router: Arc<Router>, server_host: String) -> Self {
        Self { socket_path, registry, router, server_host }
    }

    /// Remove a stale socket file, bind, and accept connections until
    /// `cancel` fires. The socket is removed again on the way out (§4.10
    /// lifecycle).
    pub async fn run(&self, cancel: CancellationToken) -> std::io::Result<()> {
        let _ = std::fs::remove_file(&self.socket_path);
        if let Some(parent) = self.socket_path.parent() {
            create_socket_dir(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        set_socket_mode(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "IPC listener started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let registry = Arc::clone(&self.registry);
                            let router = Arc::clone(&self.router);
                            let server_host = self.server_host.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, registry, router, server_host).await {
                                    debug!(error = %e, "IPC connection ended with an error");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "IPC accept failed"),
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
    registry: Arc<ClientRegistry>,
    router: Arc<Router>,
    server_host: String,
) -> Result<(), waymon_core::error::ProtocolError> {
    loop {
        let request: IpcRequest = match protocol::read_message(&mut stream).await {
            Ok(r) => r,
            Err(_) => return Ok(()), // client disconnected or sent garbage; not fatal to the server
        };
        let response = handle_request(request, &registry, &router, &server_host).await;
        protocol::write_message(&mut stream, &response).await?;
    }
}

async fn handle_request(
    request: IpcRequest,
    registry: &ClientRegistry,
    router: &Router,
    server_host: &str,
) -> IpcResponse {
    match request {
        IpcRequest::Status => status_response(registry, router, server_host).await,
        IpcRequest::Switch { action } => switch_response(action, router).await,
        IpcRequest::Release => match router.release().await {
            Ok(_) => IpcResponse::Ok,
            Err(e) => IpcResponse::Error(IpcErrorBody::new(e.to_string())),
        },
        IpcRequest::Connect { slot } => connect_response(slot, registry, router).await,
    }
}

async fn status_response(registry: &ClientRegistry, router: &Router, server_host: &str) -> IpcResponse {
    let snapshot = registry.snapshot().await;
    let target = router.current().await;
    let current_computer = match &target {
        SwitchTarget::Local => "local".to_string(),
        SwitchTarget::Client(id) => {
            snapshot.iter().find(|c| &c.session_id == id).map(|c| c.client_name.clone()).unwrap_or_else(|| id.clone())
        }
    };
    IpcResponse::Status(StatusResponse {
        active: !matches!(target, SwitchTarget::Local),
        connected: !snapshot.is_empty(),
        server_host: server_host.to_string(),
        current_computer,
        total_computers: snapshot.len() as u32,
        computer_names: snapshot.into_iter().map(|c| c.client_name).collect(),
    })
}

async fn switch_response(action: SwitchAction, router: &Router) -> IpcResponse {
    let result = match action {
        SwitchAction::Next => router.switch_next().await,
        SwitchAction::Previous => router.switch_prev().await,
        SwitchAction::Enable => router.switch_next().await,
        SwitchAction::Disable => router.release().await,
    };
    match result {
        Ok(_) => IpcResponse::Ok,
        Err(e) => IpcResponse::Error(IpcErrorBody::new(e.to_string())),
    }
}

async fn connect_response(slot: u8, registry: &ClientRegistry, router: &Router) -> IpcResponse {
    if !(1..=5).contains(&slot) {
        return IpcResponse::Error(IpcErrorBody::new(format!("invalid slot {slot}, expected 1..=5")));
    }
    let ids = registry.ordered_ids().await;
    let Some(id) = ids.get((slot - 1) as usize) else {
        return IpcResponse::Error(IpcErrorBody::new(format!("no client connected in slot {slot}")));
    };
    match router.switch_to(id).await {
        Ok(_) => IpcResponse::Ok,
        Err(e) => IpcResponse::Error(IpcErrorBody::new(e.to_string())),
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
