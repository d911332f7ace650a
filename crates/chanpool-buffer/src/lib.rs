//! Buffer elements and bounded read/write queues.
//!
//! Every managed channel owns one read queue and one write queue of
//! [`BufferElement`]s. The queues decouple I/O readiness from the pace of
//! producers and consumers:
//! - the write queue rejects new elements when full (back-pressure)
//! - the read queue evicts its oldest element when full (drop-oldest)
//!
//! Payloads are opaque; nothing in this crate interprets byte content.

pub mod element;
pub mod error;
pub mod queue;

pub use element::{BufferElement, CompletionWaiter};
pub use error::{CompletionError, QueueError, Result};
pub use queue::{ElementQueue, OverflowPolicy, DEFAULT_QUEUE_CAPACITY};
