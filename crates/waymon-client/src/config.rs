// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `waymon-client` top-level configuration (§ ambient stack), composed from
//! the same shared blocks `waymon-server` uses.

use std::path::PathBuf;
use std::time::Duration;

use waymon_core::config::{expand_tilde, AuthArgs, IpcArgs, LogArgs, TransportArgs};

/// Default path for the emergency-release sentinel file (§4.9, §6).
pub const DEFAULT_EMERGENCY_SENTINEL: &str = "/tmp/waymon-client-release";

/// Default idle window before the activity-timeout emergency trigger fires.
pub const DEFAULT_ACTIVITY_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, clap::Parser)]
#[command(name = "waymon-client", about = "Waymon input-sharing client daemon")]
pub struct ClientConfig {
    /// Server address to connect to, `host:port`.
    #[arg(long, env = "WAYMON_SERVER_ADDR")]
    pub server_addr: String,

    /// This host's display name, announced in `CLIENT_CONFIG`.
    #[arg(long, env = "WAYMON_CLIENT_NAME")]
    pub client_name: Option<String>,

    /// `source_id` this client stamps onto control events it originates.
    #[arg(long, default_value = "client", env = "WAYMON_CLIENT_ID")]
    pub client_id: String,

    /// Path this client's identity keypair is persisted under.
    #[arg(long, default_value = "~/.config/waymon/client_identity.pk8", env = "WAYMON_IDENTITY_PATH")]
    pub identity_path: PathBuf,

    /// Emergency-release sentinel file path (§4.9).
    #[arg(long, default_value = DEFAULT_EMERGENCY_SENTINEL, env = "WAYMON_EMERGENCY_SENTINEL")]
    pub emergency_sentinel: PathBuf,

    /// Idle window, in seconds, before the activity-timeout trigger fires.
    #[arg(long, default_value_t = DEFAULT_ACTIVITY_TIMEOUT_SECS, env = "WAYMON_ACTIVITY_TIMEOUT_SECS")]
    pub activity_timeout_secs: u64,

    #[command(flatten)]
    pub auth: AuthArgs,

    #[command(flatten)]
    pub ipc: IpcArgs,

    #[command(flatten)]
    pub log: LogArgs,

    #[command(flatten)]
    pub transport: TransportArgs,
}

impl ClientConfig {
    pub fn identity_path(&self) -> PathBuf {
        expand_tilde(&self.identity_path)
    }

    pub fn activity_timeout(&self) -> Duration {
        Duration::from_secs(self.activity_timeout_secs)
    }

    /// Display name to announce, falling back to the OS hostname (§6
    /// compositor-detection env vars cover desktop info, not the hostname
    /// itself, which std already exposes portably).
    pub fn resolved_client_name(&self) -> String {
        self.client_name.clone().unwrap_or_else(|| {
            std::env::var("HOSTNAME").unwrap_or_else(|_| "waymon-client".to_string())
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server_addr.is_empty() {
            anyhow::bail!("server_addr must not be empty");
        }
        if self.activity_timeout_secs == 0 {
            anyhow::bail!("activity_timeout_secs must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
