// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio_util::sync::CancellationToken;
use waymon_server::config::ServerConfig;

#[tokio::main]
async fn main() {
    let config = ServerConfig::parse();
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        install_shutdown_signal().await;
        signal_cancel.cancel();
    });

    if let Err(e) = waymon_server::run(config, cancel).await {
        eprintln!("waymon-server: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(unix)]
async fn install_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let terminate = signal(SignalKind::terminate());
    match terminate {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn install_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
