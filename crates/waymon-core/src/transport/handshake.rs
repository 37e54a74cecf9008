// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pre-codec authentication handshake run once per connection, before the
//! channel is handed to [`crate::transport::session::TransportSession`].
//!
//! The wire-level transport (§6) is "an authenticated, bidirectional
//! byte-stream channel with public-key auth" — in production an SSH
//! session whose authentication already happened below this crate. Over
//! the loopback TCP transport this workspace tests against, the
//! equivalent proof-of-possession has to happen in-band: the client sends
//! its public key, the server replies with a nonce, and the client signs
//! it. This keeps the channel binary-only after the first byte (§9): the
//! handshake uses the same length-prefixed framing as everything else, not
//! a text greeting.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::auth::Auth;
use crate::error::{ProtocolError, WaymonError};
use crate::identity::Identity;

const MAX_HANDSHAKE_FIELD: u32 = 8192;
const NONCE_LEN: usize = 32;

async fn write_field<W: AsyncWrite + Unpin>(w: &mut W, bytes: &[u8]) -> Result<(), ProtocolError> {
    w.write_u32(bytes.len() as u32).await?;
    w.write_all(bytes).await?;
    Ok(())
}

async fn read_field<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let len = r.read_u32().await?;
    if len > MAX_HANDSHAKE_FIELD {
        return Err(ProtocolError::InvalidLength { declared: len });
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

fn nonce() -> [u8; NONCE_LEN] {
    use rand::RngCore;
    let mut bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Server half of the handshake (§4.3 decision procedure). On success
/// returns the authenticated fingerprint; on rejection returns the
/// `WaymonError` to report and, for `MaxClients`, the caller is
/// responsible for writing the fatal-text sentinel the codec's
/// text-recovery path recognizes (`read_frame`'s `FATAL_TEXT_MARKERS`).
pub async fn server_handshake<S>(
    stream: &mut S,
    auth: &Auth,
    addr: std::net::SocketAddr,
) -> Result<String, WaymonError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let public_key = read_field(stream).await.map_err(|_| WaymonError::TransportIo)?;
    let challenge = nonce();
    write_field(stream, &challenge).await.map_err(|_| WaymonError::TransportIo)?;
    let signature = read_field(stream).await.map_err(|_| WaymonError::TransportIo)?;

    let verifier = ring::signature::UnparsedPublicKey::new(&ring::signature::ED25519, &public_key);
    if verifier.verify(&challenge, &signature).is_err() {
        return Err(WaymonError::AuthRejected);
    }

    auth.authenticate(addr, public_key).await
}

/// Client half of the handshake: send our public key, sign the server's
/// challenge, and learn whether we were accepted.
pub async fn client_handshake<S>(stream: &mut S, identity: &Identity) -> Result<(), WaymonError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_field(stream, identity.public_key()).await.map_err(|_| WaymonError::TransportIo)?;
    let challenge = read_field(stream).await.map_err(|_| WaymonError::TransportIo)?;
    let signature = identity.sign(&challenge);
    write_field(stream, &signature).await.map_err(|_| WaymonError::TransportIo)?;
    Ok(())
}

#[cfg(test)]
#[path = "handshake_tests.rs"]
mod tests;
