use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, info, trace, warn};

use crate::channel::{ChannelId, ManagedChannel};
use crate::pool::PoolShared;

/// Boxed error a parser may return for a payload it cannot handle.
pub type ParseError = Box<dyn StdError + Send + Sync + 'static>;

/// Application hook that consumes received payloads.
///
/// Called from the single parser thread, one payload at a time, in the
/// order each channel received them. Errors and panics are logged and the
/// worker moves on to the next payload.
pub trait PayloadParser: Send + 'static {
    fn parse(&mut self, channel: ChannelId, payload: Bytes) -> Result<(), ParseError>;
}

impl<F> PayloadParser for F
where
    F: FnMut(ChannelId, Bytes) -> Result<(), ParseError> + Send + 'static,
{
    fn parse(&mut self, channel: ChannelId, payload: Bytes) -> Result<(), ParseError> {
        self(channel, payload)
    }
}

/// Parser that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardParser;

impl PayloadParser for DiscardParser {
    fn parse(&mut self, _channel: ChannelId, _payload: Bytes) -> Result<(), ParseError> {
        Ok(())
    }
}

pub(crate) struct ParserWorker {
    shared: Arc<PoolShared>,
    parser: Box<dyn PayloadParser>,
}

impl ParserWorker {
    pub(crate) fn new(shared: Arc<PoolShared>, parser: Box<dyn PayloadParser>) -> Self {
        Self { shared, parser }
    }

    pub(crate) fn run(mut self) {
        let idle = self.shared.config.select_timeout();
        info!("parser worker started");

        while self.shared.is_running() {
            self.shared.parser_wakeup.wait_timeout(idle);
            for channel in self.shared.channels() {
                self.drain(&channel);
            }
        }

        info!("parser worker stopped");
    }

    fn drain(&mut self, channel: &ManagedChannel) {
        while let Some(element) = channel.read_queue().pop() {
            self.deliver(channel.id(), element.into_payload());
        }
    }

    fn deliver(&mut self, id: ChannelId, payload: Bytes) {
        let len = payload.len();
        let parser = &mut self.parser;
        match panic::catch_unwind(AssertUnwindSafe(|| parser.parse(id, payload))) {
            Ok(Ok(())) => trace!(channel = %id, len, "payload parsed"),
            Ok(Err(err)) => warn!(channel = %id, len, error = %err, "parser rejected payload"),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(channel = %id, len, panic = %message, "parser panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_parsers() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut parser = move |channel: ChannelId, payload: Bytes| -> Result<(), ParseError> {
            tx.send((channel, payload))?;
            Ok(())
        };
        parser.parse(ChannelId::new(1), Bytes::from_static(b"a")).unwrap();
        parser.parse(ChannelId::new(2), Bytes::from_static(b"b")).unwrap();

        let seen: Vec<_> = rx.try_iter().collect();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], (ChannelId::new(2), Bytes::from_static(b"b")));
    }

    #[test]
    fn parser_errors_are_boxed() {
        let mut parser = |_: ChannelId, payload: Bytes| -> Result<(), ParseError> {
            if payload.is_empty() {
                return Err("empty payload".into());
            }
            Ok(())
        };
        let err = parser.parse(ChannelId::new(1), Bytes::new()).unwrap_err();
        assert_eq!(err.to_string(), "empty payload");
        assert!(DiscardParser.parse(ChannelId::new(1), Bytes::new()).is_ok());
    }
}
