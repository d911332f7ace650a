#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::process::Command;
use std::thread;
use std::time::Duration;

fn chanpool() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_chanpool"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    listener.local_addr().expect("local addr")
}

fn unique_temp_file(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "chanpool-cli-{tag}-{}-{}.json",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ))
}

#[test]
fn send_with_wait_prints_response() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).expect("read request");
        assert_eq!(&buf, b"PING");
        stream.write_all(b"PONG").expect("write response");
        thread::sleep(Duration::from_millis(200));
    });

    let output = chanpool()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(addr.to_string())
        .arg("--data")
        .arg("PING")
        .arg("--wait")
        .output()
        .expect("send should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let line: serde_json::Value =
        serde_json::from_str(stdout.trim()).expect("send should emit json");
    assert_eq!(line["payload"], "PONG");
    assert_eq!(line["payload_size"], 4);
    server.join().expect("server thread");
}

#[test]
fn send_to_unreachable_remote_times_out() {
    let output = chanpool()
        .arg("send")
        .arg(unused_addr().to_string())
        .arg("--data")
        .arg("x")
        .arg("--connect-timeout")
        .arg("300ms")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn watch_prints_payloads_until_count() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream.write_all(b"hello").expect("write");
        thread::sleep(Duration::from_millis(500));
    });

    let output = chanpool()
        .arg("--format")
        .arg("pretty")
        .arg("watch")
        .arg(addr.to_string())
        .arg("--count")
        .arg("1")
        .arg("--duration")
        .arg("10s")
        .output()
        .expect("watch should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("payload=hello"), "stdout: {stdout}");
    server.join().expect("server thread");
}

#[test]
fn status_reports_connected_channel() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");

    let output = chanpool()
        .arg("--format")
        .arg("json")
        .arg("status")
        .arg(addr.to_string())
        .arg("--duration")
        .arg("2s")
        .output()
        .expect("status should run");

    assert!(output.status.success());
    let snapshots: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status should emit json");
    assert_eq!(snapshots[0]["state"], "connected");
    assert_eq!(snapshots[0]["remote"], addr.to_string());
    drop(listener);
}

#[test]
fn status_of_unreachable_remote_returns_30() {
    let output = chanpool()
        .arg("--format")
        .arg("json")
        .arg("status")
        .arg(unused_addr().to_string())
        .arg("--duration")
        .arg("300ms")
        .output()
        .expect("status should run");

    assert_eq!(output.status.code(), Some(30));
}

#[test]
fn status_reads_channels_from_config_file() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    let path = unique_temp_file("status");
    std::fs::write(
        &path,
        format!(
            r#"{{ "select_timeout_ms": 20, "channels": [{{ "name": "primary", "remote": "{addr}" }}] }}"#
        ),
    )
    .expect("config should be writable");

    let output = chanpool()
        .arg("--format")
        .arg("json")
        .arg("status")
        .arg("--config")
        .arg(&path)
        .arg("--duration")
        .arg("2s")
        .output()
        .expect("status should run");

    assert!(output.status.success());
    let snapshots: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("status should emit json");
    assert_eq!(snapshots[0]["name"], "primary");
    let _ = std::fs::remove_file(&path);
    drop(listener);
}

#[test]
fn invalid_config_returns_60() {
    let path = unique_temp_file("invalid");
    std::fs::write(&path, r#"{ "read_buffer_size": 0 }"#).expect("config should be writable");

    let output = chanpool()
        .arg("status")
        .arg("127.0.0.1:9")
        .arg("--config")
        .arg(&path)
        .output()
        .expect("status should run");

    assert_eq!(output.status.code(), Some(60));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn missing_channels_is_usage_error() {
    let output = chanpool().arg("watch").output().expect("watch should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = chanpool().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("chanpool {}", env!("CARGO_PKG_VERSION")));
}
