use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;

use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::{Channel, ReadOutcome, Transport, TransportKind};

/// TCP stream transport.
///
/// Handles are allocated through `socket2` so that socket options can be
/// applied before the non-blocking connect is issued, then handed to `mio`
/// for readiness notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

impl Transport for TcpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn open(&self, remote: SocketAddr) -> Result<Box<dyn Channel>> {
        Ok(Box::new(TcpChannel::open(remote)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Pending,
    Connected,
}

/// A non-blocking TCP stream handle.
#[derive(Debug)]
pub struct TcpChannel {
    stream: mio::net::TcpStream,
    phase: Phase,
    remote: Option<SocketAddr>,
}

impl TcpChannel {
    /// Allocate an unconnected stream socket for the address family of `remote`.
    pub fn open(remote: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(remote), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| TransportError::Allocation {
                kind: "tcp",
                source,
            })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::Allocation {
                kind: "tcp",
                source,
            })?;

        let stream = mio::net::TcpStream::from_std(std::net::TcpStream::from(socket));
        Ok(Self {
            stream,
            phase: Phase::Idle,
            remote: None,
        })
    }

    fn connect_error(&self, source: io::Error) -> TransportError {
        match self.remote {
            Some(addr) => TransportError::Connect { addr, source },
            None => TransportError::Io(source),
        }
    }
}

impl Channel for TcpChannel {
    fn connect(&mut self, remote: SocketAddr) -> Result<()> {
        self.remote = Some(remote);
        match SockRef::from(&self.stream).connect(&SockAddr::from(remote)) {
            Ok(()) => {
                debug!(%remote, "tcp connect completed immediately");
                self.phase = Phase::Connected;
                Ok(())
            }
            Err(err) if connect_in_progress(&err) => {
                self.phase = Phase::Pending;
                Ok(())
            }
            Err(source) => Err(TransportError::Connect {
                addr: remote,
                source,
            }),
        }
    }

    fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    fn is_connection_pending(&self) -> bool {
        self.phase == Phase::Pending
    }

    fn finish_connect(&mut self) -> Result<bool> {
        match self.phase {
            Phase::Connected => return Ok(true),
            Phase::Idle => return Ok(false),
            Phase::Pending => {}
        }

        match self.stream.take_error() {
            Ok(None) => {}
            Ok(Some(err)) | Err(err) => {
                self.phase = Phase::Idle;
                return Err(self.connect_error(err));
            }
        }

        match self.stream.peer_addr() {
            Ok(_) => {
                self.phase = Phase::Connected;
                if let Err(err) = self.stream.set_nodelay(true) {
                    debug!(?err, "failed to enable TCP_NODELAY");
                }
                Ok(true)
            }
            Err(err) if matches!(err.kind(), ErrorKind::NotConnected | ErrorKind::WouldBlock) => {
                Ok(false)
            }
            Err(err) => {
                self.phase = Phase::Idle;
                Err(self.connect_error(err))
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        loop {
            match self.stream.read(buf) {
                Ok(0) if !buf.is_empty() => return Ok(ReadOutcome::Closed),
                Ok(n) => return Ok(ReadOutcome::Data(n)),
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::WouldBlock)
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        loop {
            match self.stream.write(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn set_keep_alive(&self, enabled: bool) -> Result<()> {
        SockRef::from(&self.stream)
            .set_keepalive(enabled)
            .map_err(|source| TransportError::Config {
                option: "SO_KEEPALIVE",
                source,
            })
    }

    fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> Result<()> {
        registry
            .register(&mut self.stream, token, interest)
            .map_err(TransportError::Io)
    }

    fn deregister(&mut self, registry: &Registry) -> Result<()> {
        registry
            .deregister(&mut self.stream)
            .map_err(TransportError::Io)
    }
}

/// Whether a non-blocking `connect(2)` reported an in-flight connection.
fn connect_in_progress(err: &io::Error) -> bool {
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    err.kind() == ErrorKind::WouldBlock
}
