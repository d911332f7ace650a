use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use crate::element::BufferElement;
use crate::error::{CompletionError, QueueError, Result};

/// Default number of elements a queue holds.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What a full queue does with a new element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the oldest element to make room. Used for read queues so the
    /// selector never stalls on a slow consumer.
    DropOldest,
    /// Refuse the new element. Used for write queues so producers see
    /// back-pressure.
    Reject,
}

/// Bounded FIFO of buffer elements shared between one producer and one consumer.
///
/// Enqueue order equals dequeue order. Only [`ElementQueue::requeue_front`]
/// puts an element ahead of others, and only for the unwritten remainder of
/// the element just dequeued.
#[derive(Debug)]
pub struct ElementQueue {
    state: Mutex<QueueState>,
    capacity: usize,
    policy: OverflowPolicy,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<BufferElement>,
    closed: bool,
    dropped: u64,
}

impl ElementQueue {
    /// Create a queue holding at most `capacity` elements (minimum 1).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            capacity: capacity.max(1),
            policy,
        }
    }

    /// Append an element.
    ///
    /// Under [`OverflowPolicy::DropOldest`] a full queue evicts and returns
    /// its oldest element. Under [`OverflowPolicy::Reject`] a full queue
    /// fails with [`QueueError::Full`].
    pub fn push(&self, element: BufferElement) -> Result<Option<BufferElement>> {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            element.fail(CompletionError::Closed);
            return Err(QueueError::Closed);
        }

        let mut evicted = None;
        if state.items.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::Reject => {
                    return Err(QueueError::Full {
                        capacity: self.capacity,
                    })
                }
                OverflowPolicy::DropOldest => {
                    evicted = state.items.pop_front();
                    state.dropped = state.dropped.saturating_add(1);
                }
            }
        }

        state.items.push_back(element);
        Ok(evicted)
    }

    /// Put the unwritten remainder of a dequeued element back at the head.
    ///
    /// Ignores capacity: the slot was freed by the matching dequeue.
    pub fn requeue_front(&self, element: BufferElement) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            drop(state);
            element.fail(CompletionError::Closed);
            return Err(QueueError::Closed);
        }
        state.items.push_front(element);
        Ok(())
    }

    /// Take the oldest element without waiting.
    pub fn pop(&self) -> Option<BufferElement> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        state.items.pop_front()
    }

    /// Close the queue, failing pending blocking writes.
    ///
    /// Returns how many elements were discarded. Later pushes fail with
    /// [`QueueError::Closed`].
    pub fn close(&self) -> usize {
        let discarded: Vec<BufferElement> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.items.drain(..).collect()
        };

        let count = discarded.len();
        if count > 0 {
            debug!(discarded = count, "queue closed with pending elements");
        }
        for element in discarded {
            element.fail(CompletionError::Closed);
        }
        count
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether the queue holds no elements.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Maximum number of elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overflow policy of this queue.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Total elements evicted by [`OverflowPolicy::DropOldest`].
    pub fn dropped(&self) -> u64 {
        self.state.lock().dropped
    }
}
