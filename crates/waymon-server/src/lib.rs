// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Waymon server daemon library: wires the registry, router, event
//! pipeline, log sink, and local IPC surface together behind one
//! [`run`] entry point, the way `coop_mux::run` composes `MuxState`.

pub mod config;
pub mod control;
pub mod ipc;
pub mod listener;
pub mod log_forward;
pub mod pipeline;
pub mod registry;
pub mod routing;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use waymon_core::auth::Auth;
use waymon_core::ipc::protocol::socket_path;

use config::ServerConfig;
use ipc::IpcServer;
use log_forward::LogSink;
use registry::ClientRegistry;
use routing::Router;
use waymon_core::protocol::event::{ControlEvent, InputEvent, InputEventKind};

/// Build every long-lived component and run until `cancel` fires or a
/// signal handler (installed by the binary's `main`) cancels it.
pub async fn run(config: ServerConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    config.validate()?;

    tracing_subscriber_init(&config.log);

    let auth = Arc::new(Auth::load(config.whitelist_path(), config.auth.whitelist_only)?);
    let registry = Arc::new(ClientRegistry::new(config.max_clients));
    let router = Arc::new(Router::new(Arc::clone(&registry), config.server_id.clone()));
    let log_sink = Arc::new(LogSink::new(config.log_dir.clone()));

    let user = std::env::var("USER").unwrap_or_else(|_| "waymon".to_string());
    let ipc_socket = socket_path(&config.ipc.socket_dir(), &user);
    let ipc_server = IpcServer::new(ipc_socket, Arc::clone(&registry), Arc::clone(&router), config.server_id.clone());

    let ipc_cancel = cancel.child_token();
    let ipc_task = tokio::spawn(async move {
        if let Err(e) = ipc_server.run(ipc_cancel).await {
            tracing::warn!(error = %e, "IPC listener exited with an error");
        }
    });

    info!(listen_addr = %config.listen_addr, max_clients = config.max_clients, "starting waymon-server");

    let listener_result = listener::run(
        &config.listen_addr,
        auth,
        Arc::clone(&registry),
        Arc::clone(&router),
        Arc::clone(&log_sink),
        config.transport.batch_max_bytes,
        cancel.clone(),
    )
    .await;

    cancel.cancel();

    let shutdown = InputEvent::new(&config.server_id, InputEventKind::Control(ControlEvent::ServerShutdown));
    registry.send_to_all(&shutdown).await;
    registry.close_all().await;

    let _ = ipc_task.await;
    log_sink.close_all().await;

    listener_result.map_err(anyhow::Error::from)
}

fn tracing_subscriber_init(log: &waymon_core::config::LogArgs) {
    let filter = tracing_subscriber::EnvFilter::try_new(&log.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if log.log_json {
        let _ = subscriber.json().try_init();
    } else {
        let _ = subscriber.try_init();
    }
}
