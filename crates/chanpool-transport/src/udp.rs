use std::io::{self, ErrorKind};
use std::net::SocketAddr;

use mio::{Interest, Registry, Token};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{Channel, ReadOutcome, Transport, TransportKind};

/// Largest datagram a UDP socket can receive.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Connected UDP datagram transport.
///
/// `connect` fixes the default peer; there is no pending phase and no
/// orderly close. Each read yields exactly one non-empty datagram; empty
/// datagrams carry nothing and are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpTransport;

impl Transport for UdpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn open(&self, remote: SocketAddr) -> Result<Box<dyn Channel>> {
        Ok(Box::new(UdpChannel::open(remote)?))
    }
}

/// A non-blocking connected UDP socket.
#[derive(Debug)]
pub struct UdpChannel {
    socket: mio::net::UdpSocket,
    connected: bool,
}

impl UdpChannel {
    /// Allocate an unbound datagram socket for the address family of `remote`.
    pub fn open(remote: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(remote), Type::DGRAM, Some(Protocol::UDP))
            .map_err(|source| TransportError::Allocation {
                kind: "udp",
                source,
            })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| TransportError::Allocation {
                kind: "udp",
                source,
            })?;

        Ok(Self {
            socket: mio::net::UdpSocket::from_std(std::net::UdpSocket::from(socket)),
            connected: false,
        })
    }
}

impl Channel for UdpChannel {
    fn connect(&mut self, remote: SocketAddr) -> Result<()> {
        self.socket
            .connect(remote)
            .map_err(|source| TransportError::Connect {
                addr: remote,
                source,
            })?;
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_connection_pending(&self) -> bool {
        false
    }

    fn finish_connect(&mut self) -> Result<bool> {
        Ok(self.connected)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome> {
        loop {
            match self.socket.recv(buf) {
                Ok(0) => {
                    trace!("skipped empty datagram");
                    continue;
                }
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
            match self.socket.send(buf) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(0),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if refuses_payload(&err) => {
                    return Err(TransportError::Rejected {
                        len: buf.len(),
                        source: err,
                    })
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }

    fn min_read_buffer(&self) -> usize {
        MAX_DATAGRAM_SIZE
    }

    fn set_keep_alive(&self, enabled: bool) -> Result<()> {
        if !enabled {
            return Ok(());
        }
        Err(TransportError::Config {
            option: "SO_KEEPALIVE",
            source: io::Error::new(
                ErrorKind::Unsupported,
                "keep-alive is not supported on datagram sockets",
            ),
        })
    }

    fn register(&mut self, registry: &Registry, token: Token, interest: Interest) -> Result<()> {
        registry
            .register(&mut self.socket, token, interest)
            .map_err(TransportError::Io)
    }

    fn deregister(&mut self, registry: &Registry) -> Result<()> {
        registry
            .deregister(&mut self.socket)
            .map_err(TransportError::Io)
    }
}

/// Errors caused by the datagram itself, such as exceeding the maximum size.
fn refuses_payload(err: &io::Error) -> bool {
    if err.kind() == ErrorKind::InvalidInput {
        return true;
    }
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::EMSGSIZE) {
        return true;
    }
    false
}
