use tempfile::tempdir;
use tokio::net::TcpListener;
use waymon_core::auth::Auth;
use waymon_core::protocol::event::{ClientCapabilities, ClientConfig};
use waymon_core::transport::handshake;

use super::*;

fn sample_config() -> ClientConfig {
    ClientConfig {
        client_id: "me".into(),
        client_name: "laptop".into(),
        monitors: vec![],
        capabilities: ClientCapabilities { keyboard: true, mouse: true, scroll: true },
        compositor: "sway".into(),
        injector_version: "1".into(),
        keyboard_layout: "us".into(),
    }
}

#[tokio::test]
async fn connect_completes_handshake_and_announces_config() {
    let dir = tempdir().expect("tempdir");
    let auth = Auth::load(dir.path().join("whitelist.json"), false).expect("auth");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    let server_task = tokio::spawn(async move {
        let (mut stream, peer) = listener.accept().await.expect("accept");
        handshake::server_handshake(&mut stream, &auth, peer).await.expect("server handshake")
    });

    let identity = Identity::load_or_generate(dir.path().join("id.pk8")).expect("identity");
    let (session, _rx) = connect(
        &addr.to_string(),
        &identity,
        sample_config(),
        "me",
        64 * 1024,
        CancellationToken::new(),
    )
    .await
    .expect("connect");

    let fingerprint = tokio::time::timeout(std::time::Duration::from_secs(1), server_task)
        .await
        .expect("server task completed")
        .expect("join");
    assert_eq!(fingerprint, identity.fingerprint());
    assert!(!session.is_closed());
}
