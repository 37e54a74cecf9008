// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use waymon_client::config::ClientConfig;
use waymon_client::injector::Injector;
use waymon_core::error::WaymonError;

/// Logs what it would inject instead of touching real input devices.
///
/// A real backend adapts a platform's synthetic-input surface (`uinput`,
/// `XTestFakeMotionEvent`, the Wayland virtual-pointer/keyboard
/// protocols); that adapter is an external collaborator outside this
/// crate's scope (§1, §6) and is supplied by whoever packages this
/// binary for a given platform.
struct NullInjector;

impl Injector for NullInjector {
    fn start(&self) -> Result<(), WaymonError> {
        warn!("no platform injector backend is configured; running in log-only mode");
        Ok(())
    }

    fn stop(&self) {}

    fn inject_mouse_move(&self, dx: f64, dy: f64) {
        tracing::debug!(dx, dy, "inject_mouse_move (log-only)");
    }

    fn inject_mouse_position(&self, x: f64, y: f64) {
        tracing::debug!(x, y, "inject_mouse_position (log-only)");
    }

    fn inject_mouse_button(&self, button: u8, pressed: bool) {
        tracing::debug!(button, pressed, "inject_mouse_button (log-only)");
    }

    fn inject_mouse_scroll(&self, dx: f64, dy: f64) {
        tracing::debug!(dx, dy, "inject_mouse_scroll (log-only)");
    }

    fn inject_key(&self, key: u32, pressed: bool) {
        tracing::debug!(key, pressed, "inject_key (log-only)");
    }
}

#[tokio::main]
async fn main() {
    let config = ClientConfig::parse();
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        install_shutdown_signal().await;
        signal_cancel.cancel();
    });

    if let Err(e) = waymon_client::run(config, NullInjector, cancel).await {
        eprintln!("waymon-client: {e:#}");
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
