use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::time::Duration;

use bytes::{Buf, Bytes};

use crate::error::CompletionError;

/// A unit of data in flight, plus its delivery-mode flag.
///
/// The payload is immutable once the element is queued; a partial write only
/// advances past the bytes the transport accepted.
pub struct BufferElement {
    payload: Bytes,
    blocking: bool,
    completion: Option<Completion>,
}

impl BufferElement {
    /// Create an element with the given blocking-mode flag and no completion.
    pub fn new(payload: impl Into<Bytes>, blocking: bool) -> Self {
        Self {
            payload: payload.into(),
            blocking,
            completion: None,
        }
    }

    /// Create a blocking element and the waiter notified once it is written.
    pub fn blocking(payload: impl Into<Bytes>) -> (Self, CompletionWaiter) {
        let (completion, waiter) = completion_pair();
        let element = Self {
            payload: payload.into(),
            blocking: true,
            completion: Some(completion),
        };
        (element, waiter)
    }

    /// Create a fire-and-forget element.
    pub fn non_blocking(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, false)
    }

    /// Remaining payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Number of remaining payload bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether no payload bytes remain.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether the producer expects the write to complete before proceeding.
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    /// Drop the first `written` bytes after a partial write.
    pub fn advance(&mut self, written: usize) {
        let written = written.min(self.payload.len());
        self.payload.advance(written);
    }

    /// Consume the element, returning its payload.
    ///
    /// A pending completion is reported as discarded.
    pub fn into_payload(mut self) -> Bytes {
        if let Some(completion) = self.completion.take() {
            completion.notify(Err(CompletionError::Discarded));
        }
        std::mem::take(&mut self.payload)
    }

    /// Report that every byte of the element was written.
    pub fn complete(mut self) {
        if let Some(completion) = self.completion.take() {
            completion.notify(Ok(()));
        }
    }

    /// Report that the element will never be written.
    pub fn fail(mut self, err: CompletionError) {
        if let Some(completion) = self.completion.take() {
            completion.notify(Err(err));
        }
    }
}

impl fmt::Debug for BufferElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferElement")
            .field("len", &self.payload.len())
            .field("blocking", &self.blocking)
            .field("has_completion", &self.completion.is_some())
            .finish()
    }
}

/// Sending half of a blocking-write notification.
struct Completion {
    tx: SyncSender<Result<(), CompletionError>>,
}

impl Completion {
    fn notify(self, result: Result<(), CompletionError>) {
        // The waiter may have given up already.
        let _ = self.tx.try_send(result);
    }
}

/// Receiving half of a blocking-write notification.
#[derive(Debug)]
pub struct CompletionWaiter {
    rx: Receiver<Result<(), CompletionError>>,
}

impl CompletionWaiter {
    /// Wait until the element is written, failed, or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Result<(), CompletionError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CompletionError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(CompletionError::Discarded),
        }
    }
}

fn completion_pair() -> (Completion, CompletionWaiter) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Completion { tx }, CompletionWaiter { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_keeps_unwritten_tail() {
        let mut element = BufferElement::non_blocking(&b"0123456789"[..]);
        element.advance(4);
        assert_eq!(element.payload().as_ref(), b"456789");
        element.advance(100);
        assert!(element.is_empty());
    }

    #[test]
    fn complete_notifies_waiter() {
        let (element, waiter) = BufferElement::blocking(&b"abc"[..]);
        assert!(element.is_blocking());
        element.complete();
        assert_eq!(waiter.wait(Duration::from_millis(10)), Ok(()));
    }

    #[test]
    fn fail_reports_reason() {
        let (element, waiter) = BufferElement::blocking(&b"abc"[..]);
        element.fail(CompletionError::Closed);
        assert_eq!(
            waiter.wait(Duration::from_millis(10)),
            Err(CompletionError::Closed)
        );
    }

    #[test]
    fn dropped_element_is_discarded() {
        let (element, waiter) = BufferElement::blocking(&b"abc"[..]);
        drop(element);
        assert_eq!(
            waiter.wait(Duration::from_millis(10)),
            Err(CompletionError::Discarded)
        );
    }

    #[test]
    fn waiter_times_out() {
        let (_element, waiter) = BufferElement::blocking(&b"abc"[..]);
        assert_eq!(
            waiter.wait(Duration::from_millis(10)),
            Err(CompletionError::TimedOut)
        );
    }

    #[test]
    fn non_blocking_has_no_completion() {
        let element = BufferElement::new(&b"x"[..], false);
        assert!(!element.is_blocking());
        assert_eq!(
            format!("{element:?}"),
            "BufferElement { len: 1, blocking: false, has_completion: false }"
        );
        assert_eq!(element.into_payload().as_ref(), b"x");
    }
}
