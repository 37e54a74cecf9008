use std::path::Path;

use super::*;

#[test]
fn expand_tilde_substitutes_home() {
    std::env::set_var("HOME", "/home/waymon");
    assert_eq!(expand_tilde(Path::new("~/config.json")), Path::new("/home/waymon/config.json"));
}

#[test]
fn expand_tilde_leaves_absolute_paths_unchanged() {
    assert_eq!(expand_tilde(Path::new("/etc/waymon.json")), Path::new("/etc/waymon.json"));
}

#[test]
fn ipc_socket_dir_defaults_to_temp_dir() {
    let args = IpcArgs { ipc_dir: None };
    assert_eq!(args.socket_dir(), std::env::temp_dir());
}

#[test]
fn ipc_socket_dir_honors_override() {
    let args = IpcArgs { ipc_dir: Some(std::path::PathBuf::from("/var/run/waymon")) };
    assert_eq!(args.socket_dir(), std::path::PathBuf::from("/var/run/waymon"));
}

#[test]
fn transport_args_convert_millis_to_duration() {
    let args = TransportArgs { batch_max_bytes: 1024, health_check_ms: 5000, connect_timeout_ms: 10_000 };
    assert_eq!(args.health_check_interval(), std::time::Duration::from_secs(5));
    assert_eq!(args.connect_timeout(), std::time::Duration::from_secs(10));
}
