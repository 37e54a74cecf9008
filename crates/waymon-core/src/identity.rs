// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-host identity keypair used to authenticate a transport session (§6).
//!
//! The spec's transport is, in production, an SSH session — key generation,
//! storage, and the SSH handshake itself belong to that external channel.
//! This crate still needs concrete key material to exercise auth end to
//! end over the loopback TCP transport it tests against, so a host's
//! identity is an Ed25519 keypair persisted next to the whitelist. The
//! "DER-encoded public key" spec.md fingerprints is, here, the raw
//! 32-byte Ed25519 public key — see DESIGN.md for why that substitution is
//! equivalent for fingerprinting purposes.

use std::path::{Path, PathBuf};

use ring::signature::{Ed25519KeyPair, KeyPair};

/// A host's persisted signing identity.
pub struct Identity {
    keypair: Ed25519KeyPair,
    public_key: Vec<u8>,
}

impl Identity {
    /// Load the keypair at `path`, generating and persisting a new one if
    /// absent. The PKCS#8 document is written with mode 0600.
    pub fn load_or_generate(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let pkcs8 = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let generated = generate_and_persist(path)?;
                generated
            }
            Err(e) => return Err(e.into()),
        };
        let keypair = Ed25519KeyPair::from_pkcs8(&pkcs8)
            .map_err(|e| anyhow::anyhow!("invalid identity key at {}: {e}", path.display()))?;
        let public_key = keypair.public_key().as_ref().to_vec();
        Ok(Self { keypair, public_key })
    }

    /// This host's public key, in the encoding [`crate::auth::fingerprint`]
    /// hashes.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn fingerprint(&self) -> String {
        crate::auth::fingerprint(&self.public_key)
    }

    /// Sign `message`, proving possession of the private key during the
    /// handshake.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.keypair.sign(message).as_ref().to_vec()
    }
}

fn generate_and_persist(path: &Path) -> anyhow::Result<Vec<u8>> {
    let rng = ring::rand::SystemRandom::new();
    let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
        .map_err(|e| anyhow::anyhow!("failed to generate identity key: {e}"))?
        .as_ref()
        .to_vec();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_private_file(path, &pkcs8)?;
    Ok(pkcs8)
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .and_then(|mut f| {
            use std::io::Write;
            f.write_all(contents)
        })
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Default identity key path, colocated with the whitelist by convention.
pub fn default_identity_path(config_dir: &Path) -> PathBuf {
    config_dir.join("identity.pk8")
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
