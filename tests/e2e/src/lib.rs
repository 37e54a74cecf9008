// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process end-to-end harness: spins up real `waymon_server::run` and
//! `waymon_client::run` tasks against loopback TCP plus their local IPC
//! sockets, the way `coop_specs::CoopProcess` drives a real binary but
//! without needing a prebuilt artifact on disk.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use clap::Parser;
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use waymon_client::config::ClientConfig;
use waymon_client::injector::Injector;
use waymon_core::auth::Auth;
use waymon_core::error::WaymonError;
use waymon_core::identity::Identity;
use waymon_core::ipc::protocol::{self, IpcRequest, IpcResponse};
use waymon_server::config::ServerConfig;

/// Bind to an ephemeral port, then release it. Racy in theory, fine for a
/// single-process test suite in practice.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Records every call an `Injector` receives, for assertions, while
/// remaining cloneable so a handle can be kept after the original is moved
/// into `waymon_client::run`.
#[derive(Clone, Default)]
pub struct RecordingInjector {
    inner: Arc<StdMutex<RecordingInjectorState>>,
}

#[derive(Default)]
struct RecordingInjectorState {
    moves: Vec<(f64, f64)>,
    positions: Vec<(f64, f64)>,
    keys: Vec<(u32, bool)>,
}

impl RecordingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn moves(&self) -> Vec<(f64, f64)> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).moves.clone()
    }

    pub fn positions(&self) -> Vec<(f64, f64)> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).positions.clone()
    }

    pub fn keys(&self) -> Vec<(u32, bool)> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).keys.clone()
    }
}

impl Injector for RecordingInjector {
    fn start(&self) -> Result<(), WaymonError> {
        Ok(())
    }

    fn stop(&self) {}

    fn inject_mouse_move(&self, dx: f64, dy: f64) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).moves.push((dx, dy));
    }

    fn inject_mouse_position(&self, x: f64, y: f64) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).positions.push((x, y));
    }

    fn inject_mouse_button(&self, _button: u8, _pressed: bool) {}

    fn inject_mouse_scroll(&self, _dx: f64, _dy: f64) {}

    fn inject_key(&self, key: u32, pressed: bool) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).keys.push((key, pressed));
    }
}

/// A running `waymon_server::run` task plus the fixtures it needs torn
/// down with it.
pub struct ServerHarness {
    pub addr: String,
    pub ipc_socket: PathBuf,
    pub whitelist_path: PathBuf,
    cancel: CancellationToken,
    task: JoinHandle<anyhow::Result<()>>,
    _tmp: TempDir,
}

pub struct ServerOptions {
    pub max_clients: usize,
    pub whitelist_only: bool,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { max_clients: 1, whitelist_only: false }
    }
}

impl ServerHarness {
    pub async fn start(opts: ServerOptions) -> anyhow::Result<Self> {
        let tmp = TempDir::new()?;
        let port = free_port()?;
        let addr = format!("127.0.0.1:{port}");
        let whitelist_path = tmp.path().join("whitelist.json");
        let ipc_dir = tmp.path().join("ipc");

        let config = ServerConfig::parse_from([
            "waymon-server",
            "--listen-addr",
            &addr,
            "--max-clients",
            &opts.max_clients.to_string(),
            "--whitelist-path",
            whitelist_path.to_str().expect("utf8 path"),
            "--whitelist-only",
            &opts.whitelist_only.to_string(),
            "--ipc-dir",
            ipc_dir.to_str().expect("utf8 path"),
            "--log-dir",
            tmp.path().join("logs").to_str().expect("utf8 path"),
        ]);

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let user = std::env::var("USER").unwrap_or_else(|_| "waymon".to_string());
        let ipc_socket = waymon_core::ipc::protocol::socket_path(&ipc_dir, &user);
        let task = tokio::spawn(async move { waymon_server::run(config, task_cancel).await });

        wait_for_tcp(&addr).await?;

        Ok(Self { addr, ipc_socket, whitelist_path, cancel, task, _tmp: tmp })
    }

    pub async fn ipc(&self, request: IpcRequest) -> anyhow::Result<IpcResponse> {
        ipc_roundtrip(&self.ipc_socket, request).await
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.cancel.cancel();
        self.task.await??;
        Ok(())
    }
}

/// Pre-register `identity`'s fingerprint on a server-side whitelist before
/// the server process ever starts, simulating an already-trusted host.
pub async fn pre_whitelist(whitelist_path: &std::path::Path, identity: &Identity) -> anyhow::Result<()> {
    let auth = Auth::load(whitelist_path, true)?;
    auth.add_fingerprint(&identity.fingerprint()).await?;
    Ok(())
}

/// A running `waymon_client::run` task driven by a [`RecordingInjector`].
pub struct ClientHarness {
    pub ipc_socket: PathBuf,
    pub injector: RecordingInjector,
    cancel: CancellationToken,
    task: JoinHandle<anyhow::Result<()>>,
    _tmp: TempDir,
}

pub struct ClientOptions {
    pub client_id: String,
    pub client_name: String,
}

impl ClientHarness {
    pub async fn start(server_addr: &str, opts: ClientOptions) -> anyhow::Result<Self> {
        let tmp = TempDir::new()?;
        let identity_path = tmp.path().join("identity.pk8");
        let ipc_dir = tmp.path().join("ipc");

        let config = ClientConfig::parse_from([
            "waymon-client",
            "--server-addr",
            server_addr,
            "--client-id",
            &opts.client_id,
            "--client-name",
            &opts.client_name,
            "--identity-path",
            identity_path.to_str().expect("utf8 path"),
            "--ipc-dir",
            ipc_dir.to_str().expect("utf8 path"),
        ]);

        let injector = RecordingInjector::new();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let user = std::env::var("USER").unwrap_or_else(|_| "waymon".to_string());
        let ipc_socket = waymon_core::ipc::protocol::socket_path(&ipc_dir, &user);

        let task_injector = injector.clone();
        let task = tokio::spawn(async move { waymon_client::run(config, task_injector, task_cancel).await });

        Ok(Self { ipc_socket, injector, cancel, task, _tmp: tmp })
    }

    pub async fn ipc(&self) -> anyhow::Result<IpcResponse> {
        for _ in 0..100 {
            if self.ipc_socket.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        ipc_roundtrip(&self.ipc_socket, IpcRequest::Status).await
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.cancel.cancel();
        self.task.await??;
        Ok(())
    }
}

async fn ipc_roundtrip(socket_path: &std::path::Path, request: IpcRequest) -> anyhow::Result<IpcResponse> {
    let mut stream = UnixStream::connect(socket_path).await?;
    protocol::write_message(&mut stream, &request).await?;
    let response = protocol::read_message(&mut stream).await?;
    Ok(response)
}

async fn wait_for_tcp(addr: &str) -> anyhow::Result<()> {
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    anyhow::bail!("server never became connectable at {addr}")
}
