//! Echo example: one pool channel talking to a local echo server.
//!
//! Run with:
//!   cargo run --example echo-pool

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use chanpool::engine::{ChannelConfig, ChannelId, ChannelPool, ParseError, PoolConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let server = thread::spawn(move || -> std::io::Result<()> {
        let (mut stream, peer) = listener.accept()?;
        eprintln!("[server] accepted {peer}");
        let mut buf = [0u8; 1024];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                return Ok(());
            }
            stream.write_all(&buf[..n])?;
        }
    });

    let (tx, rx) = mpsc::channel();
    let parser = move |channel: ChannelId, payload: Bytes| -> Result<(), ParseError> {
        tx.send((channel, payload))?;
        Ok(())
    };
    let pool = ChannelPool::start(PoolConfig::default(), parser)?;
    let id = pool.add_channel(ChannelConfig::tcp(addr).with_name("echo"))?;

    while pool.state(id)? != chanpool::ChannelState::Connected {
        thread::sleep(Duration::from_millis(10));
    }

    pool.submit(id, &b"hello pool"[..], true)?;
    let (from, payload) = rx.recv_timeout(Duration::from_secs(5))?;
    eprintln!(
        "[client] {from} echoed: {}",
        String::from_utf8_lossy(&payload)
    );

    pool.shutdown();
    server.join().map_err(|_| "server thread panicked")??;
    Ok(())
}
