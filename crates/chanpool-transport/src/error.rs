use std::net::SocketAddr;

/// Errors that can occur in channel transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to allocate a new transport handle (resource exhaustion).
    #[error("failed to allocate {kind} handle: {source}")]
    Allocation {
        kind: &'static str,
        source: std::io::Error,
    },

    /// Failed to initiate or complete a connection to the remote address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred on an established handle.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport refused this payload. The handle itself is still usable.
    #[error("transport refused a {len}-byte payload: {source}")]
    Rejected {
        len: usize,
        source: std::io::Error,
    },

    /// A socket option could not be applied.
    #[error("failed to set {option}: {source}")]
    Config {
        option: &'static str,
        source: std::io::Error,
    },

    /// The handle has been released.
    #[error("channel closed")]
    Closed,
}

impl TransportError {
    /// Whether this error is a connection-establishment failure.
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Connect { .. })
    }

    /// Whether the failure belongs to the payload rather than the connection.
    pub fn is_payload_rejected(&self) -> bool {
        matches!(self, TransportError::Rejected { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
