use chanpool_buffer::{CompletionError, QueueError};

use crate::channel::ChannelId;

/// Errors that can occur in pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] chanpool_transport::TransportError),

    /// No channel with this id was ever added.
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),

    /// The channel has been shut down.
    #[error("channel {0} closed")]
    ChannelClosed(ChannelId),

    /// The channel's write queue is full.
    #[error("channel {channel} write queue full (capacity {capacity})")]
    QueueFull { channel: ChannelId, capacity: usize },

    /// A blocking write did not complete in time.
    #[error("write on channel {channel} did not complete within {timeout:?}")]
    Timeout {
        channel: ChannelId,
        timeout: std::time::Duration,
    },

    /// A blocking write was dropped before it reached the transport.
    #[error("write on channel {0} was discarded")]
    Discarded(ChannelId),

    /// The transport refused the payload; the channel stays up.
    #[error("payload rejected by the transport on channel {0}")]
    PayloadRejected(ChannelId),

    /// Configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed.
    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// The selector could not be created or woken.
    #[error("selector error: {0}")]
    Selector(std::io::Error),
}

impl PoolError {
    pub(crate) fn from_queue(channel: ChannelId, err: QueueError) -> Self {
        match err {
            QueueError::Full { capacity } => PoolError::QueueFull { channel, capacity },
            QueueError::Closed => PoolError::ChannelClosed(channel),
        }
    }

    pub(crate) fn from_completion(
        channel: ChannelId,
        timeout: std::time::Duration,
        err: CompletionError,
    ) -> Self {
        match err {
            CompletionError::Closed => PoolError::ChannelClosed(channel),
            CompletionError::Discarded => PoolError::Discarded(channel),
            CompletionError::Rejected => PoolError::PayloadRejected(channel),
            CompletionError::TimedOut => PoolError::Timeout { channel, timeout },
        }
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
