// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnection manager (C8, §4.8): exponential backoff reattachment,
//! grounded on the teacher's `mux_client::run` retry loop generalized from
//! register-then-heartbeat to connect-handshake-announce.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The backoff delay before the `attempt`-th retry (1-indexed), per the
/// `min(2^(i-1), 60)` testable property (§8).
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let secs = INITIAL_BACKOFF.as_secs().saturating_mul(1u64 << attempt.saturating_sub(1).min(6));
    Duration::from_secs(secs.min(MAX_BACKOFF.as_secs()))
}

/// Serializes concurrent reconnect triggers so only one attempt sequence
/// runs at a time (§4.8).
pub struct ReconnectGuard {
    in_progress: AtomicBool,
}

impl ReconnectGuard {
    pub fn new() -> Self {
        Self { in_progress: AtomicBool::new(false) }
    }

    /// Attempt to claim the guard. Returns `false` if a reconnect sequence
    /// is already running.
    pub fn try_begin(&self) -> bool {
        !self.in_progress.swap(true, Ordering::SeqCst)
    }

    pub fn finish(&self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

impl Default for ReconnectGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry `connect_once` with exponential backoff until it succeeds or
/// `cancel` fires, reporting textual transitions via `on_status`.
///
/// `connect_once` is given `CONNECT_TIMEOUT` to either succeed or be
/// abandoned for this attempt; the caller's closure is responsible for
/// performing the TCP connect, handshake, and `CLIENT_CONFIG` re-announce
/// inside that budget.
pub async fn run_until_connected<F, Fut>(
    cancel: &tokio_util::sync::CancellationToken,
    on_status: &(dyn Fn(&str) + Send + Sync),
    mut connect_once: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        attempt += 1;
        on_status(&format!("attempting {attempt}…"));

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return false,
            result = tokio::time::timeout(CONNECT_TIMEOUT, connect_once()) => result,
        };

        match outcome {
            Ok(Ok(())) => {
                on_status("reconnected");
                info!(attempt, "reconnect succeeded");
                return true;
            }
            Ok(Err(e)) => warn!(attempt, error = %e, "reconnect attempt failed"),
            Err(_) => warn!(attempt, "reconnect attempt timed out"),
        }

        let delay = backoff_for_attempt(attempt);
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
#[path = "reconnect_tests.rs"]
mod tests;
