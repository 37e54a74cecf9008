// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Emergency release (C9, §4.9): three independent triggers that force
//! `being_controlled = false` regardless of what the server thinks the
//! state is.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::injector::{InjectionPipeline, Injector};

const SENTINEL_POLL_INTERVAL: Duration = Duration::from_secs(1);
const ACTIVITY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Reason a [`trigger_release`] firing is reported to `on_emergency`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyReason {
    Signal,
    SentinelFile,
    ActivityTimeout,
}

/// Tracks the last time input activity was observed and performs the
/// idempotent release sequence when any trigger fires.
pub struct EmergencyMonitor {
    last_activity_ns: AtomicI64,
    triggered: AtomicBool,
    sentinel_path: PathBuf,
    activity_timeout: Duration,
}

impl EmergencyMonitor {
    pub fn new(sentinel_path: PathBuf, activity_timeout: Duration) -> Self {
        Self {
            last_activity_ns: AtomicI64::new(waymon_core::time::monotonic_now_ns()),
            triggered: AtomicBool::new(false),
            sentinel_path,
            activity_timeout,
        }
    }

    /// Reset the activity timer; called on every inbound event while
    /// connected (§4.9 trigger 3).
    pub fn update_activity(&self) {
        self.last_activity_ns.store(waymon_core::time::monotonic_now_ns(), Ordering::SeqCst);
        self.triggered.store(false, Ordering::SeqCst);
    }

    /// Fire the release sequence exactly once per armed period. Calls
    /// `on_emergency(reason)` before touching the injector's
    /// being-controlled flag, so UIs observe the reason first (§4.9).
    pub fn trigger_release<I: Injector>(
        &self,
        reason: EmergencyReason,
        pipeline: &InjectionPipeline<I>,
        on_emergency: &(dyn Fn(EmergencyReason) + Send + Sync),
    ) {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(?reason, "emergency release triggered");
        on_emergency(reason);
        pipeline.set_being_controlled(false);
    }

    /// Poll the sentinel file every second; remove it after triggering
    /// (§4.9 trigger 2). Runs until `cancel` fires.
    pub async fn run_sentinel_watch<I: Injector>(
        self: &Arc<Self>,
        pipeline: Arc<InjectionPipeline<I>>,
        on_emergency: Arc<dyn Fn(EmergencyReason) + Send + Sync>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(SENTINEL_POLL_INTERVAL) => {}
            }
            if tokio::fs::metadata(&self.sentinel_path).await.is_ok() {
                self.trigger_release(EmergencyReason::SentinelFile, &pipeline, on_emergency.as_ref());
                let _ = tokio::fs::remove_file(&self.sentinel_path).await;
            }
        }
    }

    /// Poll the activity timer every 5 s; fire if no inbound event has
    /// been observed within `activity_timeout` (§4.9 trigger 3).
    pub async fn run_activity_watch<I: Injector>(
        self: &Arc<Self>,
        pipeline: Arc<InjectionPipeline<I>>,
        on_emergency: Arc<dyn Fn(EmergencyReason) + Send + Sync>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(ACTIVITY_POLL_INTERVAL) => {}
            }
            if !pipeline.being_controlled() {
                continue;
            }
            let last = self.last_activity_ns.load(Ordering::SeqCst);
            let idle_ns = waymon_core::time::monotonic_now_ns().saturating_sub(last);
            if idle_ns >= self.activity_timeout.as_nanos() as i64 {
                self.trigger_release(EmergencyReason::ActivityTimeout, &pipeline, on_emergency.as_ref());
            }
        }
    }

    /// Install the platform signal trigger (§4.9 trigger 1). On Unix this
    /// is `SIGUSR1`, the conventional "user-defined" release signal.
    #[cfg(unix)]
    pub async fn run_signal_watch<I: Injector>(
        self: &Arc<Self>,
        pipeline: Arc<InjectionPipeline<I>>,
        on_emergency: Arc<dyn Fn(EmergencyReason) + Send + Sync>,
        cancel: CancellationToken,
    ) {
        use tokio::signal::unix::{signal, SignalKind};
        let mut stream = match signal(SignalKind::user_defined1()) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to install emergency-release signal handler");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                received = stream.recv() => {
                    if received.is_none() {
                        return;
                    }
                    info!("SIGUSR1 received, forcing emergency release");
                    self.trigger_release(EmergencyReason::Signal, &pipeline, on_emergency.as_ref());
                }
            }
        }
    }

    #[cfg(not(unix))]
    pub async fn run_signal_watch<I: Injector>(
        self: &Arc<Self>,
        _pipeline: Arc<InjectionPipeline<I>>,
        _on_emergency: Arc<dyn Fn(EmergencyReason) + Send + Sync>,
        cancel: CancellationToken,
    ) {
        cancel.cancelled().await;
    }
}

#[cfg(test)]
#[path = "emergency_tests.rs"]
mod tests;
