// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log forwarding sink (C11, §4.11): writes client-tunneled `Log` events to
//! a per-hostname append-only file.
//!
//! Grounded on the teacher's `credential/persist.rs` convention of
//! `create_dir_all` + a restrictive mode before writing secrets-adjacent
//! files to disk, generalized here to lazily-opened per-client log files
//! instead of one persisted JSON document.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use waymon_core::protocol::event::LogEvent;

const DIR_MODE: u32 = 0o750;
const FILE_MODE: u32 = 0o600;

/// Lazily-opened per-hostname log files under `log_dir` (§6 filesystem
/// layout: `<log_dir>/waymon_client_<hostname>.log`).
pub struct LogSink {
    log_dir: PathBuf,
    files: Mutex<HashMap<String, File>>,
}

impl LogSink {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self { log_dir: log_dir.into(), files: Mutex::new(HashMap::new()) }
    }

    fn path_for(&self, hostname: &str) -> PathBuf {
        self.log_dir.join(format!("waymon_client_{hostname}.log"))
    }

    /// Append one forwarded log line, opening (and header-stamping) the
    /// file on first use for this hostname.
    pub async fn handle(
        &self,
        hostname: &str,
        remote_addr: Option<SocketAddr>,
        event: &LogEvent,
    ) -> std::io::Result<()> {
        let mut files = self.files.lock().await;
        let file = match files.entry(hostname.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(self.open_with_header(hostname, remote_addr).await?),
        };

        let line = format!(
            "{} [{}] {}\n",
            waymon_core::time::monotonic_now_ns(),
            event.level.as_str(),
            event.message
        );
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    async fn open_with_header(&self, hostname: &str, remote_addr: Option<SocketAddr>) -> std::io::Result<File> {
        create_log_dir(&self.log_dir).await?;
        let path = self.path_for(hostname);
        let mut file = open_append(&path).await?;
        let addr_str = remote_addr.map(|a| a.to_string()).unwrap_or_else(|| "unknown".to_string());
        let header = format!(
            "# session opened at {} from {}\n",
            waymon_core::time::monotonic_now_ns(),
            addr_str
        );
        file.write_all(header.as_bytes()).await?;
        Ok(file)
    }

    /// Flush and drop every open handle (server shutdown, §4.11).
    pub async fn close_all(&self) {
        let mut files = self.files.lock().await;
        for (_, mut file) in files.drain() {
            let _ = file.flush().await;
        }
    }
}

#[cfg(unix)]
async fn create_log_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(DIR_MODE)).await
}

#[cfg(not(unix))]
async fn create_log_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

#[cfg(unix)]
async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).mode(FILE_MODE).open(path).await
}

#[cfg(not(unix))]
async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

#[cfg(test)]
#[path = "log_forward_tests.rs"]
mod tests;
