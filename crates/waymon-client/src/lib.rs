// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Waymon client daemon library: wires the injection pipeline, emergency
//! monitors, reconnection manager, and local IPC surface together behind
//! one [`run`] entry point, the way `waymon_server::run` composes its own
//! long-lived components.

pub mod config;
pub mod control;
pub mod emergency;
pub mod injector;
pub mod ipc;
pub mod reconnect;
pub mod session;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use waymon_core::identity::Identity;
use waymon_core::ipc::protocol::socket_path;
use waymon_core::protocol::event::{ClientCapabilities, ClientConfig as WireClientConfig};

use config::ClientConfig;
use control::ControlStatus;
use emergency::{EmergencyMonitor, EmergencyReason};
use injector::{InjectionPipeline, Injector};
use ipc::IpcServer as ClientIpcServer;
use reconnect::ReconnectGuard;

/// Build every long-lived component and run until `cancel` fires.
///
/// `injector` is the platform-specific synthetic input backend (§6); the
/// caller supplies it since the concrete implementation is an external
/// collaborator outside this crate's scope, the same boundary
/// `waymon_server::pipeline::CaptureSource` draws on the server side.
pub async fn run<I: Injector + 'static>(config: ClientConfig, injector: I, cancel: CancellationToken) -> anyhow::Result<()> {
    config.validate()?;

    tracing_subscriber_init(&config.log);

    let identity = Identity::load_or_generate(config.identity_path())?;
    let client_name = config.resolved_client_name();

    let status = Arc::new(ControlStatus::new());
    let pipeline = Arc::new(InjectionPipeline::new(injector));
    pipeline.start()?;

    let emergency = Arc::new(EmergencyMonitor::new(config.emergency_sentinel.clone(), config.activity_timeout()));
    let on_emergency: Arc<dyn Fn(EmergencyReason) + Send + Sync> = Arc::new(|reason| {
        warn!(?reason, "input injection forcibly released");
    });

    let watch_cancel = cancel.child_token();
    {
        let emergency = Arc::clone(&emergency);
        let pipeline = Arc::clone(&pipeline);
        let on_emergency = Arc::clone(&on_emergency);
        let cancel = watch_cancel.clone();
        tokio::spawn(async move { emergency.run_sentinel_watch(pipeline, on_emergency, cancel).await });
    }
    {
        let emergency = Arc::clone(&emergency);
        let pipeline = Arc::clone(&pipeline);
        let on_emergency = Arc::clone(&on_emergency);
        let cancel = watch_cancel.clone();
        tokio::spawn(async move { emergency.run_activity_watch(pipeline, on_emergency, cancel).await });
    }
    {
        let emergency = Arc::clone(&emergency);
        let pipeline = Arc::clone(&pipeline);
        let on_emergency = Arc::clone(&on_emergency);
        let cancel = watch_cancel.clone();
        tokio::spawn(async move { emergency.run_signal_watch(pipeline, on_emergency, cancel).await });
    }

    let user = std::env::var("USER").unwrap_or_else(|_| "waymon".to_string());
    let ipc_socket = socket_path(&config.ipc.socket_dir(), &user);
    let ipc_server = ClientIpcServer::new(ipc_socket, Arc::clone(&status), config.server_addr.clone(), client_name.clone());
    let ipc_cancel = cancel.child_token();
    let ipc_task = tokio::spawn(async move {
        if let Err(e) = ipc_server.run(ipc_cancel).await {
            warn!(error = %e, "IPC listener exited with an error");
        }
    });

    info!(server_addr = %config.server_addr, client_id = %config.client_id, "starting waymon-client");

    let wire_config = WireClientConfig {
        client_id: config.client_id.clone(),
        client_name,
        monitors: vec![],
        capabilities: ClientCapabilities { keyboard: true, mouse: true, scroll: true },
        compositor: std::env::var("XDG_CURRENT_DESKTOP").unwrap_or_else(|_| "unknown".to_string()),
        injector_version: env!("CARGO_PKG_VERSION").to_string(),
        keyboard_layout: std::env::var("WAYMON_KEYBOARD_LAYOUT").unwrap_or_else(|_| "us".to_string()),
    };

    let reconnect_guard = ReconnectGuard::new();
    let mut exit_reason = None;
    while !cancel.is_cancelled() {
        if !reconnect_guard.try_begin() {
            break;
        }

        let established = Arc::new(std::sync::Mutex::new(None));
        let connected = reconnect::run_until_connected(&cancel, &|status_text| info!(%status_text, "reconnect status"), || {
            let server_addr = config.server_addr.clone();
            let identity = &identity;
            let wire_config = wire_config.clone();
            let client_id = config.client_id.clone();
            let batch_max_bytes = config.transport.batch_max_bytes;
            let session_cancel = cancel.child_token();
            let established = Arc::clone(&established);
            async move {
                let (session, rx) =
                    session::connect(&server_addr, identity, wire_config, &client_id, batch_max_bytes, session_cancel).await?;
                *established.lock().unwrap_or_else(|e| e.into_inner()) = Some((session, rx));
                Ok(())
            }
        })
        .await;
        reconnect_guard.finish();

        if !connected {
            break;
        }
        let Some((session, rx)) = established.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            break;
        };
        status.mark_connected();

        let emergency_for_loop = Arc::clone(&emergency);
        let on_activity = move || emergency_for_loop.update_activity();
        let loop_exit = control::run(&config.client_id, rx, Arc::clone(&status), Arc::clone(&pipeline), on_activity).await;

        session.close();
        status.mark_disconnected();
        exit_reason = Some(loop_exit);

        if loop_exit == control::LoopExit::SessionClosed {
            info!("session closed, entering reconnect loop");
        }
    }

    cancel.cancel();
    let _ = ipc_task.await;
    pipeline.stop();

    info!(?exit_reason, "waymon-client shutting down");
    Ok(())
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
