// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `waymon-server` top-level configuration, composed from the shared
//! `waymon_core::config` blocks the way `cli::config::Config` composes its
//! transport/auth/log blocks (§ ambient stack).

use std::path::PathBuf;

use waymon_core::config::{expand_tilde, AuthArgs, IpcArgs, LogArgs, TransportArgs};

/// Default cap on simultaneously connected clients (§4.4).
pub const DEFAULT_MAX_CLIENTS: usize = 1;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "waymon-server", about = "Waymon input-sharing server daemon")]
pub struct ServerConfig {
    /// Address to accept client connections on.
    #[arg(long, default_value = "0.0.0.0:7070", env = "WAYMON_LISTEN_ADDR")]
    pub listen_addr: String,

    /// Identifier this server stamps onto captured events (`source_id`).
    #[arg(long, default_value = "server", env = "WAYMON_SERVER_ID")]
    pub server_id: String,

    /// Maximum number of simultaneously connected clients (§4.4).
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS, env = "WAYMON_MAX_CLIENTS")]
    pub max_clients: usize,

    /// Directory client logs are forwarded into (§4.11).
    #[arg(long, default_value = "/var/log/waymon", env = "WAYMON_LOG_DIR")]
    pub log_dir: PathBuf,

    /// Path this server's identity keypair is persisted under.
    #[arg(long, default_value = "~/.config/waymon/server_identity.pk8", env = "WAYMON_IDENTITY_PATH")]
    pub identity_path: PathBuf,

    #[command(flatten)]
    pub auth: AuthArgs,

    #[command(flatten)]
    pub ipc: IpcArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(flatten)]
    pub transport: TransportArgs,
}

impl ServerConfig {
    pub fn identity_path(&self) -> PathBuf {
        expand_tilde(&self.identity_path)
    }

    pub fn whitelist_path(&self) -> PathBuf {
        expand_tilde(&self.auth.whitelist_path)
    }

    /// Validate cross-field invariants not expressible via `clap` alone,
    /// the way `cli::config::Config::validate` does.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_clients == 0 {
            anyhow::bail!("max_clients must be at least 1");
        }
        if self.listen_addr.is_empty() {
            anyhow::bail!("listen_addr must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
