use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use chanpool_buffer::BufferElement;
use chanpool_transport::{transport_for, Transport};
use mio::{Poll, Registry, Waker};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::channel::{ChannelId, ChannelSnapshot, ChannelState, ManagedChannel};
use crate::config::{ChannelConfig, PoolConfig};
use crate::error::{PoolError, Result};
use crate::parser::{ParserWorker, PayloadParser};
use crate::registry::{ChannelEntry, RegistrationTable, WAKER_TOKEN};
use crate::selector::SelectorLoop;
use crate::signal::Signal;
use crate::supervisor::ReconnectSupervisor;

pub(crate) const SELECTOR_THREAD: &str = "chanpool-selector";
pub(crate) const SUPERVISOR_THREAD: &str = "chanpool-reconnect";
pub(crate) const PARSER_THREAD: &str = "chanpool-parser";

/// State shared by the pool facade and its worker threads.
pub(crate) struct PoolShared {
    pub(crate) config: PoolConfig,
    pub(crate) table: Mutex<RegistrationTable>,
    pub(crate) registry: Registry,
    directory: RwLock<HashMap<ChannelId, Arc<ManagedChannel>>>,
    retired: Mutex<HashSet<ChannelId>>,
    waker: Waker,
    running: AtomicBool,
    next_id: AtomicU64,
    pub(crate) parser_wakeup: Signal,
    pub(crate) supervisor_wakeup: Signal,
}

impl PoolShared {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn wake_selector(&self) {
        if let Err(err) = self.waker.wake() {
            warn!(error = %err, "failed to wake selector");
        }
    }

    /// Every live channel, ordered by id.
    pub(crate) fn channels(&self) -> Vec<Arc<ManagedChannel>> {
        let mut channels: Vec<_> = self.directory.read().values().cloned().collect();
        channels.sort_by_key(|channel| channel.id());
        channels
    }

    fn lookup(&self, id: ChannelId) -> Result<Arc<ManagedChannel>> {
        if let Some(channel) = self.directory.read().get(&id) {
            return Ok(Arc::clone(channel));
        }
        if self.retired.lock().contains(&id) {
            Err(PoolError::ChannelClosed(id))
        } else {
            Err(PoolError::UnknownChannel(id))
        }
    }
}

/// A pool of long-lived network channels served by three worker threads:
/// a readiness selector, a reconnect supervisor and a payload parser.
///
/// ```no_run
/// use chanpool_engine::{ChannelConfig, ChannelId, ChannelPool, ParseError, PoolConfig};
///
/// let parser = |channel: ChannelId, payload: bytes::Bytes| -> Result<(), ParseError> {
///     println!("{channel}: {} bytes", payload.len());
///     Ok(())
/// };
/// let pool = ChannelPool::start(PoolConfig::default(), parser)?;
/// let id = pool.add_channel(ChannelConfig::tcp("127.0.0.1:7000".parse().unwrap()))?;
/// pool.submit(id, &b"PING"[..], false)?;
/// pool.shutdown();
/// # Ok::<(), chanpool_engine::PoolError>(())
/// ```
pub struct ChannelPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl ChannelPool {
    /// Start the worker threads and connect every channel listed in `config`.
    pub fn start(config: PoolConfig, parser: impl PayloadParser) -> Result<Self> {
        config.validate()?;

        let poll = Poll::new().map_err(PoolError::Selector)?;
        let registry = poll.registry().try_clone().map_err(PoolError::Selector)?;
        let waker = Waker::new(poll.registry(), WAKER_TOKEN).map_err(PoolError::Selector)?;
        let initial = config.channels.clone();

        let shared = Arc::new(PoolShared {
            config,
            table: Mutex::new(RegistrationTable::default()),
            registry,
            directory: RwLock::new(HashMap::new()),
            retired: Mutex::new(HashSet::new()),
            waker,
            running: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            parser_wakeup: Signal::default(),
            supervisor_wakeup: Signal::default(),
        });

        let mut pool = Self {
            shared: Arc::clone(&shared),
            workers: Vec::with_capacity(3),
        };

        let selector = SelectorLoop::new(poll, Arc::clone(&shared));
        pool.spawn(SELECTOR_THREAD, move || selector.run())?;
        let supervisor = ReconnectSupervisor::new(Arc::clone(&shared));
        pool.spawn(SUPERVISOR_THREAD, move || supervisor.run())?;
        let worker = ParserWorker::new(Arc::clone(&shared), Box::new(parser));
        pool.spawn(PARSER_THREAD, move || worker.run())?;

        info!(channels = initial.len(), "channel pool started");
        for channel in initial {
            pool.add_channel(channel)?;
        }
        Ok(pool)
    }

    fn spawn(&mut self, name: &'static str, body: impl FnOnce() + Send + 'static) -> Result<()> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|source| PoolError::Spawn { name, source })?;
        self.workers.push(handle);
        Ok(())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Add a channel using the built-in transport for its kind and start
    /// connecting it. A failed first attempt is retried by the supervisor.
    pub fn add_channel(&self, config: ChannelConfig) -> Result<ChannelId> {
        let transport = transport_for(config.transport);
        self.add_channel_with_transport(config, transport)
    }

    /// Add a channel backed by a caller-provided transport.
    pub fn add_channel_with_transport(
        &self,
        config: ChannelConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<ChannelId> {
        if !self.shared.is_running() {
            return Err(PoolError::InvalidConfig("pool is shut down".to_string()));
        }
        let id = ChannelId::new(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let channel = Arc::new(ManagedChannel::new(id, &config, &self.shared.config));
        let backoff = Backoff::new(&self.shared.config.backoff);

        let state = {
            let mut table = self.shared.table.lock();
            table.insert(ChannelEntry::new(Arc::clone(&channel), transport, backoff));
            self.shared.directory.write().insert(id, Arc::clone(&channel));
            table.connect(id, &self.shared.registry, Instant::now())
        };
        self.shared.wake_selector();

        info!(
            channel = %id,
            name = channel.name(),
            remote = %channel.remote(),
            transport = %channel.transport(),
            state = ?state,
            "channel added"
        );
        Ok(id)
    }

    /// Queue `payload` for writing on `id`.
    ///
    /// A non-blocking submit returns once the payload is queued. A blocking
    /// submit additionally waits until every byte reached the transport, or
    /// fails with [`PoolError::Timeout`] after the configured write timeout.
    pub fn submit(&self, id: ChannelId, payload: impl Into<Bytes>, blocking: bool) -> Result<()> {
        let channel = self.shared.lookup(id)?;
        if !blocking {
            channel
                .write_queue()
                .push(BufferElement::non_blocking(payload))
                .map_err(|err| PoolError::from_queue(id, err))?;
            self.shared.wake_selector();
            return Ok(());
        }

        let (element, waiter) = BufferElement::blocking(payload);
        channel
            .write_queue()
            .push(element)
            .map_err(|err| PoolError::from_queue(id, err))?;
        self.shared.wake_selector();

        let timeout = self.shared.config.blocking_write_timeout();
        waiter
            .wait(timeout)
            .map_err(|err| PoolError::from_completion(id, timeout, err))
    }

    pub fn state(&self, id: ChannelId) -> Result<ChannelState> {
        Ok(self.shared.lookup(id)?.state())
    }

    pub fn snapshot(&self, id: ChannelId) -> Result<ChannelSnapshot> {
        Ok(self.shared.lookup(id)?.snapshot())
    }

    /// Snapshots of every live channel, ordered by id.
    pub fn snapshots(&self) -> Vec<ChannelSnapshot> {
        self.shared.channels().iter().map(|c| c.snapshot()).collect()
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.shared.channels().iter().map(|c| c.id()).collect()
    }

    /// Deregister and close one channel. Pending writes fail with
    /// [`PoolError::ChannelClosed`], as does every later call naming `id`.
    pub fn remove_channel(&self, id: ChannelId) -> Result<()> {
        self.shared.lookup(id)?;
        let removed = {
            let mut table = self.shared.table.lock();
            let removed = table.remove(id, &self.shared.registry);
            self.shared.directory.write().remove(&id);
            self.shared.retired.lock().insert(id);
            removed
        };
        match removed {
            Some(_) => {
                info!(channel = %id, "channel removed");
                Ok(())
            }
            None => Err(PoolError::ChannelClosed(id)),
        }
    }

    /// Stop the workers and close every channel.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.workers.is_empty() && !self.shared.is_running() {
            return;
        }
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake_selector();
        self.shared.supervisor_wakeup.notify();
        self.shared.parser_wakeup.notify();

        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("worker").to_string();
            if worker.join().is_err() {
                warn!(thread = %name, "worker thread panicked");
            }
        }

        let mut table = self.shared.table.lock();
        let ids = table.ids();
        for id in &ids {
            table.remove(*id, &self.shared.registry);
        }
        self.shared.directory.write().clear();
        self.shared.retired.lock().extend(ids.iter().copied());
        debug!(closed = ids.len(), "channels closed");
        info!("channel pool stopped");
    }
}

impl Drop for ChannelPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ChannelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelPool")
            .field("channels", &self.shared.directory.read().len())
            .field("running", &self.shared.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::parser::DiscardParser;

    fn fast_config() -> PoolConfig {
        PoolConfig {
            select_timeout_ms: 10,
            reconnect_interval_ms: 10,
            blocking_write_timeout_ms: 2_000,
            ..PoolConfig::default()
        }
    }

    fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let config = PoolConfig {
            select_timeout_ms: 0,
            ..PoolConfig::default()
        };
        assert!(matches!(
            ChannelPool::start(config, DiscardParser),
            Err(PoolError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_and_closed_ids() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let pool = ChannelPool::start(fast_config(), DiscardParser).unwrap();
        let id = pool
            .add_channel(ChannelConfig::tcp(listener.local_addr().unwrap()))
            .unwrap();

        let stranger = ChannelId::new(999);
        assert!(matches!(pool.state(stranger), Err(PoolError::UnknownChannel(_))));

        pool.remove_channel(id).unwrap();
        assert!(matches!(pool.state(id), Err(PoolError::ChannelClosed(_))));
        assert!(matches!(
            pool.submit(id, &b"late"[..], false),
            Err(PoolError::ChannelClosed(_))
        ));
        assert!(matches!(pool.remove_channel(id), Err(PoolError::ChannelClosed(_))));
        pool.shutdown();
    }

    #[test]
    fn blocking_submit_waits_for_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).unwrap();
            tx.send(buf).unwrap();
        });

        let pool = ChannelPool::start(fast_config(), DiscardParser).unwrap();
        let id = pool.add_channel(ChannelConfig::tcp(addr)).unwrap();
        wait_for("connect", || pool.state(id).unwrap() == ChannelState::Connected);

        pool.submit(id, &b"hello"[..], true).unwrap();
        assert_eq!(&rx.recv_timeout(Duration::from_secs(5)).unwrap(), b"hello");
        assert_eq!(pool.snapshot(id).unwrap().bytes_written, 5);

        server.join().unwrap();
        pool.shutdown();
    }

    #[test]
    fn writes_submitted_before_connect_are_flushed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let pool = ChannelPool::start(fast_config(), DiscardParser).unwrap();
        let id = pool.add_channel(ChannelConfig::tcp(addr)).unwrap();
        pool.submit(id, &b"early"[..], false).unwrap();

        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"early");
        stream.write_all(b"ok").unwrap();
        pool.shutdown();
    }

    #[test]
    fn shutdown_fails_pending_blocking_writes() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let config = PoolConfig {
            blocking_write_timeout_ms: 10_000,
            ..fast_config()
        };
        let pool = ChannelPool::start(config, DiscardParser).unwrap();
        let id = pool.add_channel(ChannelConfig::tcp(addr)).unwrap();

        let channel = pool.shared.lookup(id).unwrap();
        let (element, waiter) = BufferElement::blocking(&b"never"[..]);
        channel.write_queue().push(element).unwrap();

        pool.shutdown();
        assert!(waiter.wait(Duration::from_secs(1)).is_err());
        assert_eq!(channel.state(), ChannelState::Closed);
    }
}
