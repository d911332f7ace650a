/// Errors that can occur when queuing buffer elements.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue is at capacity and rejects new elements.
    #[error("queue full (capacity {capacity})")]
    Full { capacity: usize },

    /// The queue has been closed; its channel was shut down.
    #[error("queue closed")]
    Closed,
}

/// Why a blocking write did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// The channel was shut down before the element was written.
    #[error("channel closed before the write completed")]
    Closed,

    /// The element was discarded without being written.
    #[error("write discarded before completion")]
    Discarded,

    /// The transport refused the payload and it was dropped.
    #[error("payload rejected by the transport")]
    Rejected,

    /// The caller stopped waiting.
    #[error("write did not complete in time")]
    TimedOut,
}

pub type Result<T> = std::result::Result<T, QueueError>;
