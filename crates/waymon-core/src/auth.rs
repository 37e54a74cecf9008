// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Public-key fingerprint whitelist and the per-connection auth decision
//! procedure (C3, §4.3).

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::WaymonError;

/// How long the approval callback is given to answer before a connection
/// attempt is rejected.
pub const AUTH_PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fingerprint of a public key, formatted as `SHA256:<base64>` (§6).
pub fn fingerprint(der_public_key: &[u8]) -> String {
    let digest = Sha256::digest(der_public_key);
    format!("SHA256:{}", base64::engine::general_purpose::STANDARD.encode(digest))
}

/// Outcome of an approval prompt: accept and remember, or reject.
pub type AuthDecision = bool;

/// Async callback invoked for a key not already on the whitelist.
///
/// Boxed rather than generic so `Auth` can hold one without infecting every
/// caller with the callback's concrete future type.
pub type AuthRequestFn = Arc<
    dyn Fn(std::net::SocketAddr, Vec<u8>, String) -> Pin<Box<dyn Future<Output = AuthDecision> + Send>>
        + Send
        + Sync,
>;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedWhitelist {
    fingerprints: Vec<String>,
}

/// Persistent set of accepted key fingerprints plus the approval callback
/// used when a presented key isn't already on it.
pub struct Auth {
    whitelist: RwLock<HashSet<String>>,
    path: PathBuf,
    whitelist_only: bool,
    on_auth_request: RwLock<Option<AuthRequestFn>>,
}

impl Auth {
    /// Load (or initialize empty) the whitelist from `path`.
    pub fn load(path: impl Into<PathBuf>, whitelist_only: bool) -> anyhow::Result<Self> {
        let path = path.into();
        let fingerprints = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let persisted: PersistedWhitelist = serde_json::from_str(&contents)?;
                persisted.fingerprints.into_iter().collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            whitelist: RwLock::new(fingerprints),
            path,
            whitelist_only,
            on_auth_request: RwLock::new(None),
        })
    }

    /// Register (or replace) the approval callback. May be called after the
    /// listener has already started accepting connections (§4.3).
    pub async fn set_auth_request_handler(&self, handler: AuthRequestFn) {
        *self.on_auth_request.write().await = Some(handler);
    }

    /// Whether `fp` is already accepted.
    pub async fn is_whitelisted(&self, fp: &str) -> bool {
        self.whitelist.read().await.contains(fp)
    }

    /// Decision procedure for one connection attempt (§4.3 steps 1-4).
    pub async fn authenticate(
        &self,
        addr: std::net::SocketAddr,
        der_public_key: Vec<u8>,
    ) -> Result<String, WaymonError> {
        let fp = fingerprint(&der_public_key);

        if self.is_whitelisted(&fp).await {
            return Ok(fp);
        }

        if !self.whitelist_only {
            return Ok(fp);
        }

        let handler = self.on_auth_request.read().await.clone();
        let Some(handler) = handler else {
            return Err(WaymonError::AuthRejected);
        };

        let decision = tokio::time::timeout(AUTH_PROMPT_TIMEOUT, handler(addr, der_public_key, fp.clone()))
            .await
            .unwrap_or(false);

        if !decision {
            return Err(WaymonError::AuthRejected);
        }

        self.add_fingerprint(&fp).await.map_err(|_| WaymonError::AuthRejected)?;
        Ok(fp)
    }

    /// Append `fp` to the whitelist and persist atomically.
    ///
    /// Rejects a fingerprint already present — the whitelist is a
    /// monotonically growing set, not an upsert target.
    pub async fn add_fingerprint(&self, fp: &str) -> anyhow::Result<()> {
        let mut whitelist = self.whitelist.write().await;
        if !whitelist.insert(fp.to_string()) {
            anyhow::bail!("fingerprint already whitelisted: {fp}");
        }
        Self::persist(&self.path, &whitelist)
    }

    /// Remove `fp` from the whitelist and persist atomically.
    pub async fn remove_fingerprint(&self, fp: &str) -> anyhow::Result<()> {
        let mut whitelist = self.whitelist.write().await;
        whitelist.remove(fp);
        Self::persist(&self.path, &whitelist)
    }

    fn persist(path: &Path, whitelist: &HashSet<String>) -> anyhow::Result<()> {
        let persisted = PersistedWhitelist { fingerprints: whitelist.iter().cloned().collect() };
        let json = serde_json::to_string_pretty(&persisted)?;
        let tmp_path = path.with_extension("tmp");
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
