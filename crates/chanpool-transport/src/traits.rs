use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use mio::{Interest, Registry, Token};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tcp::TcpTransport;
use crate::udp::UdpTransport;

/// Outcome of a single non-blocking read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes were read into the buffer.
    Data(usize),
    /// Nothing to read right now.
    WouldBlock,
    /// The remote closed the connection in an orderly way.
    Closed,
}

/// Transport variants a channel can be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// TCP stream socket.
    #[default]
    Tcp,
    /// Connected UDP datagram socket.
    Udp,
}

impl TransportKind {
    /// Transport name for diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Udp => "udp",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Factory for transport handles of one kind.
///
/// A managed channel holds one `Transport` for its whole lifetime and asks it
/// for a fresh handle every time it (re)connects.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Which transport variant this factory produces.
    fn kind(&self) -> TransportKind;

    /// Allocate a new, unconnected, non-blocking handle suitable for `remote`.
    ///
    /// Fails with [`TransportError::Allocation`](crate::TransportError::Allocation).
    fn open(&self, remote: SocketAddr) -> Result<Box<dyn Channel>>;
}

/// A single transport handle.
///
/// Every operation is non-blocking. The selector loop depends on this: a
/// handle that blocks stalls every other channel in the pool.
pub trait Channel: Send + fmt::Debug {
    /// Initiate a connection. May leave the handle in the pending state.
    fn connect(&mut self, remote: SocketAddr) -> Result<()>;

    /// Whether the connection is established.
    fn is_connected(&self) -> bool;

    /// Whether a connection attempt is in flight.
    fn is_connection_pending(&self) -> bool;

    /// Complete an in-flight connection after connect-readiness.
    ///
    /// Returns `Ok(false)` while the connection is still pending.
    fn finish_connect(&mut self) -> Result<bool>;

    /// Read up to `buf.len()` bytes.
    ///
    /// `Data(0)` is treated like `WouldBlock`.
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadOutcome>;

    /// Smallest read buffer that never truncates a message. Zero for streams.
    fn min_read_buffer(&self) -> usize {
        0
    }

    /// Write up to `buf.len()` bytes, returning how many were accepted.
    ///
    /// Returns `Ok(0)` when the transport would block, and
    /// [`TransportError::Rejected`](crate::TransportError::Rejected) when this
    /// payload can never be sent on the handle.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Enable or disable keep-alive probing.
    fn set_keep_alive(&self, enabled: bool) -> Result<()>;

    /// Register this handle for readiness notifications.
    fn register(&mut self, registry: &Registry, token: Token, interest: Interest)
        -> Result<()>;

    /// Remove this handle from the selector.
    fn deregister(&mut self, registry: &Registry) -> Result<()>;
}

/// Build the transport factory for `kind`.
pub fn transport_for(kind: TransportKind) -> Arc<dyn Transport> {
    match kind {
        TransportKind::Tcp => Arc::new(TcpTransport),
        TransportKind::Udp => Arc::new(UdpTransport),
    }
}
