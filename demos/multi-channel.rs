//! Multi-channel example: three remotes served by one pool, one of which
//! goes away and is retried in the background.
//!
//! Run with:
//!   cargo run --example multi-channel

use std::io::Write;
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use chanpool::engine::{
    BackoffConfig, ChannelConfig, ChannelId, ChannelPool, ParseError, PoolConfig,
};

fn greeter(name: &'static str) -> std::io::Result<(std::net::SocketAddr, thread::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let handle = thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = stream.write_all(format!("hello from {name}").as_bytes());
            thread::sleep(Duration::from_millis(500));
        }
    });
    Ok((addr, handle))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (alpha, alpha_server) = greeter("alpha")?;
    let (beta, beta_server) = greeter("beta")?;
    let gone = {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?
    };

    let config = PoolConfig {
        reconnect_interval_ms: 50,
        backoff: BackoffConfig {
            initial_delay_ms: 100,
            max_delay_ms: 400,
            multiplier: 2,
        },
        channels: vec![
            ChannelConfig::tcp(alpha).with_name("alpha"),
            ChannelConfig::tcp(beta).with_name("beta"),
            ChannelConfig::tcp(gone).with_name("gone"),
        ],
        ..PoolConfig::default()
    };

    let parser = |channel: ChannelId, payload: Bytes| -> Result<(), ParseError> {
        eprintln!("[parser] {channel}: {}", String::from_utf8_lossy(&payload));
        Ok(())
    };
    let pool = ChannelPool::start(config, parser)?;

    thread::sleep(Duration::from_secs(1));
    for snapshot in pool.snapshots() {
        eprintln!(
            "[status] {} {} state={} attempts={}",
            snapshot.id, snapshot.name, snapshot.state, snapshot.connect_attempts
        );
    }

    pool.shutdown();
    let _ = alpha_server.join();
    let _ = beta_server.join();
    Ok(())
}
