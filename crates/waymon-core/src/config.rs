// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration blocks shared by the server and client binaries.

use std::path::PathBuf;
use std::time::Duration;

/// Auth/whitelist configuration (C3), composed into both daemons' top-level
/// config via `#[command(flatten)]`.
#[derive(Debug, Clone, clap::Args)]
pub struct AuthArgs {
    /// Path to the persisted fingerprint whitelist.
    #[arg(long, default_value = "~/.config/waymon/whitelist.json", env = "WAYMON_WHITELIST_PATH")]
    pub whitelist_path: PathBuf,

    /// Reject any key not already on the whitelist (no open-auth fallback).
    #[arg(long, default_value_t = true, env = "WAYMON_WHITELIST_ONLY")]
    pub whitelist_only: bool,
}

/// Local IPC configuration (C10).
#[derive(Debug, Clone, clap::Args)]
pub struct IpcArgs {
    /// Directory the IPC socket is created in. Defaults to the system temp
    /// directory per §6.
    #[arg(long, env = "WAYMON_IPC_DIR")]
    pub ipc_dir: Option<PathBuf>,
}

impl IpcArgs {
    pub fn socket_dir(&self) -> PathBuf {
        self.ipc_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Logging configuration, composed into both daemons.
#[derive(Debug, Clone, clap::Args)]
pub struct LogArgs {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info` or
    /// `waymon_server=debug,waymon_core=info`.
    #[arg(long, default_value = "info", env = "WAYMON_LOG")]
    pub log_filter: String,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, default_value_t = false, env = "WAYMON_LOG_JSON")]
    pub log_json: bool,
}

/// Transport tuning shared by both ends of a session (§4.2, §5).
#[derive(Debug, Clone, clap::Args)]
pub struct TransportArgs {
    /// Minimum size the buffered writer accumulates before a forced flush.
    #[arg(long, default_value_t = 64 * 1024, env = "WAYMON_BATCH_MAX_BYTES")]
    pub batch_max_bytes: usize,

    /// Liveness ping interval, in milliseconds.
    #[arg(long, default_value_t = 5000, env = "WAYMON_HEALTH_CHECK_MS")]
    pub health_check_ms: u64,

    /// Per-attempt connect timeout, in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "WAYMON_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,
}

impl TransportArgs {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Expand a leading `~/` the way shells do. `clap` doesn't do tilde
/// expansion for `PathBuf` arguments, and config paths are the one place
/// users commonly type one.
pub fn expand_tilde(path: &std::path::Path) -> PathBuf {
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(stripped),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
