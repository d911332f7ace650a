use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chanpool_buffer::{ElementQueue, OverflowPolicy};
use chanpool_transport::TransportKind;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::config::{ChannelConfig, PoolConfig};

/// Stable identifier of a managed channel. Survives reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Connection state of a managed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ChannelState {
    /// No connection has been attempted yet.
    Unconnected = 0,
    /// A non-blocking connect is in flight.
    ConnectPending = 1,
    /// The transport is connected.
    Connected = 2,
    /// The remote closed, or an I/O error broke, the connection.
    Disconnected = 3,
    /// The handle failed to connect. Terminal for that handle.
    Failed = 4,
    /// The channel was shut down. Terminal.
    Closed = 5,
}

impl ChannelState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ChannelState::Unconnected,
            1 => ChannelState::ConnectPending,
            2 => ChannelState::Connected,
            3 => ChannelState::Disconnected,
            4 => ChannelState::Failed,
            _ => ChannelState::Closed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Unconnected => "unconnected",
            ChannelState::ConnectPending => "connect_pending",
            ChannelState::Connected => "connected",
            ChannelState::Disconnected => "disconnected",
            ChannelState::Failed => "failed",
            ChannelState::Closed => "closed",
        }
    }

    /// Whether the reconnect supervisor should revive a channel in this state.
    pub fn needs_reconnect(self) -> bool {
        matches!(self, ChannelState::Disconnected | ChannelState::Failed)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical connection-oriented endpoint tracked by the pool.
///
/// Shared by reference between the selector loop, the reconnect supervisor,
/// the parser worker and producers. The transport handle itself lives in the
/// registration table and is only reachable under its lock.
#[derive(Debug)]
pub struct ManagedChannel {
    id: ChannelId,
    name: String,
    remote: SocketAddr,
    keep_alive: bool,
    transport: TransportKind,
    state: AtomicU8,
    read_queue: ElementQueue,
    write_queue: ElementQueue,
    last_activity: Mutex<Instant>,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    connect_attempts: AtomicU64,
}

impl ManagedChannel {
    pub(crate) fn new(id: ChannelId, config: &ChannelConfig, pool: &PoolConfig) -> Self {
        Self {
            id,
            name: config.name.clone().unwrap_or_else(|| id.to_string()),
            remote: config.remote,
            keep_alive: config.keep_alive,
            transport: config.transport,
            state: AtomicU8::new(ChannelState::Unconnected as u8),
            read_queue: ElementQueue::new(pool.read_queue_capacity, OverflowPolicy::DropOldest),
            write_queue: ElementQueue::new(pool.write_queue_capacity, OverflowPolicy::Reject),
            last_activity: Mutex::new(Instant::now()),
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Current connection state.
    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, next: ChannelState) {
        let prev = ChannelState::from_u8(self.state.swap(next as u8, Ordering::AcqRel));
        if prev != next {
            debug!(channel = %self.id, from = %prev, to = %next, "channel state changed");
        }
    }

    /// Received payloads waiting for the parser worker.
    pub fn read_queue(&self) -> &ElementQueue {
        &self.read_queue
    }

    /// Submitted payloads waiting for the transport.
    pub fn write_queue(&self) -> &ElementQueue {
        &self.write_queue
    }

    /// When the channel last connected, read or wrote.
    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub(crate) fn touch(&self, now: Instant) {
        *self.last_activity.lock() = now;
    }

    pub(crate) fn record_read(&self, n: usize, now: Instant) {
        self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
        self.touch(now);
    }

    pub(crate) fn record_written(&self, n: usize, now: Instant) {
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
        self.touch(now);
    }

    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time view for diagnostics.
    pub fn snapshot(&self) -> ChannelSnapshot {
        ChannelSnapshot {
            id: self.id,
            name: self.name.clone(),
            remote: self.remote,
            transport: self.transport,
            state: self.state(),
            keep_alive: self.keep_alive,
            read_queued: self.read_queue.len(),
            write_queued: self.write_queue.len(),
            dropped_reads: self.read_queue.dropped(),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            idle_ms: duration_ms(self.last_activity().elapsed()),
        }
    }
}

/// Serializable view of a managed channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub name: String,
    pub remote: SocketAddr,
    pub transport: TransportKind,
    pub state: ChannelState,
    pub keep_alive: bool,
    pub read_queued: usize,
    pub write_queued: usize,
    pub dropped_reads: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub connect_attempts: u64,
    pub idle_ms: u64,
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> ManagedChannel {
        let config = ChannelConfig::tcp("127.0.0.1:7000".parse().unwrap()).with_keep_alive(true);
        ManagedChannel::new(ChannelId::new(3), &config, &PoolConfig::default())
    }

    #[test]
    fn starts_unconnected_with_default_name() {
        let channel = channel();
        assert_eq!(channel.state(), ChannelState::Unconnected);
        assert_eq!(channel.name(), "ch-3");
        assert!(channel.keep_alive());
        assert_eq!(channel.transport(), TransportKind::Tcp);
    }

    #[test]
    fn queues_follow_pool_policy() {
        let channel = channel();
        assert_eq!(channel.read_queue().policy(), OverflowPolicy::DropOldest);
        assert_eq!(channel.write_queue().policy(), OverflowPolicy::Reject);
    }

    #[test]
    fn state_roundtrips_through_atomic() {
        let channel = channel();
        for state in [
            ChannelState::ConnectPending,
            ChannelState::Connected,
            ChannelState::Disconnected,
            ChannelState::Failed,
            ChannelState::Closed,
        ] {
            channel.set_state(state);
            assert_eq!(channel.state(), state);
        }
    }

    #[test]
    fn reconnect_eligibility() {
        assert!(ChannelState::Disconnected.needs_reconnect());
        assert!(ChannelState::Failed.needs_reconnect());
        assert!(!ChannelState::Connected.needs_reconnect());
        assert!(!ChannelState::ConnectPending.needs_reconnect());
        assert!(!ChannelState::Closed.needs_reconnect());
    }

    #[test]
    fn snapshot_counts_traffic() {
        let channel = channel();
        let now = Instant::now();
        channel.record_read(10, now);
        channel.record_written(4, now);
        channel.record_connect_attempt();

        let snapshot = channel.snapshot();
        assert_eq!(snapshot.bytes_read, 10);
        assert_eq!(snapshot.bytes_written, 4);
        assert_eq!(snapshot.connect_attempts, 1);
        assert_eq!(snapshot.state, ChannelState::Unconnected);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["state"], "unconnected");
        assert_eq!(json["transport"], "tcp");
    }
}
