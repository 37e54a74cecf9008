use tempfile::tempdir;

use super::*;

#[test]
fn generates_and_persists_a_new_identity() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("identity.pk8");
    assert!(!path.exists());

    let identity = Identity::load_or_generate(&path).expect("generate");
    assert!(path.exists());
    assert_eq!(identity.public_key().len(), 32);
    assert!(identity.fingerprint().starts_with("SHA256:"));
}

#[test]
fn reloading_returns_the_same_identity() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("identity.pk8");

    let first = Identity::load_or_generate(&path).expect("generate");
    let second = Identity::load_or_generate(&path).expect("reload");

    assert_eq!(first.public_key(), second.public_key());
    assert_eq!(first.fingerprint(), second.fingerprint());
}

#[test]
fn signature_verifies_against_the_public_key() {
    let dir = tempdir().expect("tempdir");
    let identity = Identity::load_or_generate(dir.path().join("identity.pk8")).expect("generate");

    let message = b"waymon-handshake-nonce";
    let signature = identity.sign(message);

    let public_key = ring::signature::UnparsedPublicKey::new(&ring::signature::ED25519, identity.public_key());
    assert!(public_key.verify(message, &signature).is_ok());
}

#[cfg(unix)]
#[test]
fn identity_file_is_written_with_restrictive_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("identity.pk8");
    Identity::load_or_generate(&path).expect("generate");

    let mode = std::fs::metadata(&path).expect("metadata").permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}
