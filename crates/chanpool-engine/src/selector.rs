use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chanpool_buffer::{BufferElement, CompletionError};
use chanpool_transport::ReadOutcome;
use mio::{Events, Poll, Token};
use tracing::{debug, error, info, trace, warn};

use crate::channel::{ChannelId, ChannelState};
use crate::pool::PoolShared;
use crate::registry::{ChannelEntry, RegistrationTable, WAKER_TOKEN};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
struct Readiness {
    token: Token,
    readable: bool,
    writable: bool,
}

/// What the loop should do with a channel after servicing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Keep,
    Retire(ChannelState),
}

/// Single-threaded readiness loop over every registered channel.
pub(crate) struct SelectorLoop {
    poll: Poll,
    events: Events,
    shared: Arc<PoolShared>,
    read_buf: Vec<u8>,
}

impl SelectorLoop {
    pub(crate) fn new(poll: Poll, shared: Arc<PoolShared>) -> Self {
        let read_buf = vec![0u8; shared.config.read_buffer_size];
        Self {
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
            shared,
            read_buf,
        }
    }

    pub(crate) fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let timeout = shared.config.select_timeout();
        info!(timeout = ?timeout, "selector loop started");

        while shared.is_running() {
            if let Err(err) = self.poll.poll(&mut self.events, Some(timeout)) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %err, "selector wait failed");
                std::thread::sleep(timeout);
                continue;
            }

            let ready: Vec<Readiness> = self
                .events
                .iter()
                .filter(|event| event.token() != WAKER_TOKEN)
                .map(|event| Readiness {
                    token: event.token(),
                    readable: event.is_readable() || event.is_read_closed() || event.is_error(),
                    writable: event.is_writable() || event.is_write_closed() || event.is_error(),
                })
                .collect();

            let delivered = {
                let mut table = shared.table.lock();
                let now = Instant::now();
                let mut delivered = false;
                for readiness in ready {
                    let Some(id) = table.channel_for(readiness.token) else {
                        trace!(token = readiness.token.0, "event for stale registration");
                        continue;
                    };
                    delivered |= self.service(&mut table, id, Some(readiness), now);
                }
                for id in table.ids() {
                    delivered |= self.service(&mut table, id, None, now);
                }
                delivered
            };

            if delivered {
                shared.parser_wakeup.notify();
            }
        }

        info!("selector loop stopped");
    }

    /// Service one channel. With `readiness` it handles a reported event;
    /// without, it flushes pending writes and enforces the connect timeout.
    /// Returns whether any payload was queued for the parser.
    fn service(
        &mut self,
        table: &mut RegistrationTable,
        id: ChannelId,
        readiness: Option<Readiness>,
        now: Instant,
    ) -> bool {
        let Some(entry) = table.get_mut(id) else {
            return false;
        };
        let mut delivered = false;
        let verdict = match readiness {
            Some(ready) => self.on_event(entry, ready, now, &mut delivered),
            None => self.on_tick(entry, now),
        };
        if let Verdict::Retire(state) = verdict {
            entry.channel.set_state(state);
            table.detach(id, &self.shared.registry);
        }
        delivered
    }

    fn on_event(
        &mut self,
        entry: &mut ChannelEntry,
        ready: Readiness,
        now: Instant,
        delivered: &mut bool,
    ) -> Verdict {
        if entry.channel.state() == ChannelState::ConnectPending {
            match finish_connect(entry, now) {
                Verdict::Keep if entry.channel.state() == ChannelState::Connected => {}
                verdict => return verdict,
            }
        }
        if entry.channel.state() != ChannelState::Connected {
            return Verdict::Keep;
        }
        if ready.readable {
            match self.drain_reads(entry, now) {
                (got, Verdict::Keep) => *delivered |= got,
                (got, verdict) => {
                    *delivered |= got;
                    return verdict;
                }
            }
        }
        if ready.writable {
            return flush_writes(entry, now);
        }
        Verdict::Keep
    }

    fn on_tick(&mut self, entry: &mut ChannelEntry, now: Instant) -> Verdict {
        match entry.channel.state() {
            ChannelState::Connected => {
                entry.confirm_uptime(now);
                if entry.channel.write_queue().is_empty() {
                    Verdict::Keep
                } else {
                    flush_writes(entry, now)
                }
            }
            ChannelState::ConnectPending => {
                let timeout = self.shared.config.connect_timeout();
                match entry.pending_since {
                    Some(since) if now.saturating_duration_since(since) >= timeout => {
                        warn!(
                            channel = %entry.channel.id(),
                            remote = %entry.channel.remote(),
                            timeout = ?timeout,
                            "connect timed out"
                        );
                        Verdict::Retire(ChannelState::Failed)
                    }
                    _ => Verdict::Keep,
                }
            }
            _ => Verdict::Keep,
        }
    }

    /// Read until the transport has nothing more, queueing one element per read.
    fn drain_reads(&mut self, entry: &mut ChannelEntry, now: Instant) -> (bool, Verdict) {
        let id = entry.channel.id();
        let Some(handle) = entry.handle.as_mut() else {
            return (false, Verdict::Keep);
        };
        let needed = handle.min_read_buffer();
        if self.read_buf.len() < needed {
            self.read_buf.resize(needed, 0);
        }

        let mut received = false;
        let mut delivered = false;
        let verdict = loop {
            match handle.read(&mut self.read_buf) {
                Ok(ReadOutcome::Data(0)) | Ok(ReadOutcome::WouldBlock) => break Verdict::Keep,
                Ok(ReadOutcome::Data(n)) => {
                    received = true;
                    entry.channel.record_read(n, now);
                    let element =
                        BufferElement::non_blocking(Bytes::copy_from_slice(&self.read_buf[..n]));
                    match entry.channel.read_queue().push(element) {
                        Ok(Some(evicted)) => {
                            warn!(channel = %id, dropped = evicted.len(), "read queue full, dropped oldest payload");
                        }
                        Ok(None) => {}
                        Err(err) => {
                            debug!(channel = %id, error = %err, "read queue closed");
                            break Verdict::Keep;
                        }
                    }
                    delivered = true;
                }
                Ok(ReadOutcome::Closed) => {
                    info!(channel = %id, "remote closed connection");
                    break Verdict::Retire(ChannelState::Disconnected);
                }
                Err(err) => {
                    warn!(channel = %id, error = %err, "read failed");
                    break Verdict::Retire(ChannelState::Disconnected);
                }
            }
        };
        if received {
            entry.confirm_healthy();
        }
        (delivered, verdict)
    }
}

fn finish_connect(entry: &mut ChannelEntry, now: Instant) -> Verdict {
    let id = entry.channel.id();
    let Some(handle) = entry.handle.as_mut() else {
        return Verdict::Retire(ChannelState::Failed);
    };
    match handle.finish_connect() {
        Ok(true) => {
            entry.mark_connected(now);
            entry.channel.set_state(ChannelState::Connected);
            info!(channel = %id, remote = %entry.channel.remote(), "channel connected");
            Verdict::Keep
        }
        Ok(false) => Verdict::Keep,
        Err(err) => {
            warn!(
                channel = %id,
                remote = %entry.channel.remote(),
                attempt = entry.backoff.attempts(),
                error = %err,
                "connect failed"
            );
            Verdict::Retire(ChannelState::Failed)
        }
    }
}

/// Write queued elements in FIFO order until the queue is empty or the
/// transport stops accepting bytes. Partial writes keep their remainder at
/// the head of the queue. A payload the transport refuses outright is failed
/// and dropped without disturbing the connection.
fn flush_writes(entry: &mut ChannelEntry, now: Instant) -> Verdict {
    let id = entry.channel.id();
    let Some(handle) = entry.handle.as_mut() else {
        return Verdict::Keep;
    };
    let queue = entry.channel.write_queue();
    let mut sent = false;
    let verdict = loop {
        let Some(mut element) = queue.pop() else {
            break Verdict::Keep;
        };
        if element.is_empty() {
            element.complete();
            continue;
        }
        match handle.write(element.payload()) {
            Ok(0) => {
                let _ = queue.requeue_front(element);
                break Verdict::Keep;
            }
            Ok(n) if n < element.len() => {
                sent = true;
                entry.channel.record_written(n, now);
                element.advance(n);
                trace!(channel = %id, written = n, remaining = element.len(), "partial write");
                if queue.requeue_front(element).is_err() {
                    break Verdict::Keep;
                }
            }
            Ok(n) => {
                sent = true;
                entry.channel.record_written(n, now);
                element.complete();
            }
            Err(err) if err.is_payload_rejected() => {
                warn!(channel = %id, len = element.len(), error = %err, "payload rejected, dropped");
                element.fail(CompletionError::Rejected);
            }
            Err(err) => {
                warn!(channel = %id, error = %err, "write failed");
                let _ = queue.requeue_front(element);
                break Verdict::Retire(ChannelState::Disconnected);
            }
        }
    };
    if sent {
        entry.confirm_healthy();
    }
    verdict
}
