use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chanpool_transport::{Channel, Transport, TransportError};
use mio::{Interest, Registry, Token};
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::channel::{ChannelId, ChannelState, ManagedChannel};

/// Token reserved for the selector's waker.
pub(crate) const WAKER_TOKEN: Token = Token(0);

/// A managed channel together with its live transport handle.
#[derive(Debug)]
pub(crate) struct ChannelEntry {
    pub(crate) channel: Arc<ManagedChannel>,
    transport: Arc<dyn Transport>,
    pub(crate) handle: Option<Box<dyn Channel>>,
    token: Option<Token>,
    pub(crate) backoff: Backoff,
    pub(crate) pending_since: Option<Instant>,
    connected_since: Option<Instant>,
}

impl ChannelEntry {
    pub(crate) fn new(
        channel: Arc<ManagedChannel>,
        transport: Arc<dyn Transport>,
        backoff: Backoff,
    ) -> Self {
        Self {
            channel,
            transport,
            handle: None,
            token: None,
            backoff,
            pending_since: None,
            connected_since: None,
        }
    }

    /// Record that the current handle finished connecting at `now`.
    pub(crate) fn mark_connected(&mut self, now: Instant) {
        self.pending_since = None;
        self.connected_since = Some(now);
        self.channel.touch(now);
    }

    /// Reset the backoff once the connection has moved bytes.
    pub(crate) fn confirm_healthy(&mut self) {
        if self.backoff.attempts() > 0 {
            debug!(channel = %self.channel.id(), "connection healthy, backoff reset");
            self.backoff.reset();
        }
    }

    /// Reset the backoff when the connection has stayed up for at least the
    /// delay that preceded it, even without traffic.
    pub(crate) fn confirm_uptime(&mut self, now: Instant) {
        let Some(since) = self.connected_since else {
            return;
        };
        if self.backoff.attempts() > 0
            && now.saturating_duration_since(since) >= self.backoff.current_delay()
        {
            debug!(channel = %self.channel.id(), "connection stable, backoff reset");
            self.backoff.reset();
        }
    }

    /// Stop readiness delivery for the current handle. The handle stays
    /// owned by the entry until it is released.
    fn detach(&mut self, registry: &Registry) -> Option<Token> {
        let token = self.token.take()?;
        if let Some(handle) = self.handle.as_mut() {
            if let Err(err) = handle.deregister(registry) {
                debug!(channel = %self.channel.id(), error = %err, "deregister failed");
            }
        }
        Some(token)
    }

    /// Open, configure, connect and register a fresh handle.
    fn establish(
        &mut self,
        registry: &Registry,
        token: Token,
        now: Instant,
    ) -> Result<ChannelState, TransportError> {
        let remote = self.channel.remote();
        let mut handle = self.transport.open(remote)?;

        if self.channel.keep_alive() {
            if let Err(err) = handle.set_keep_alive(true) {
                warn!(channel = %self.channel.id(), error = %err, "keep-alive not applied");
            }
        }

        handle.connect(remote)?;
        handle.register(registry, token, Interest::READABLE | Interest::WRITABLE)?;

        let state = if handle.is_connected() {
            ChannelState::Connected
        } else {
            ChannelState::ConnectPending
        };
        self.handle = Some(handle);
        self.token = Some(token);
        self.pending_since = (state == ChannelState::ConnectPending).then_some(now);
        Ok(state)
    }
}

/// Every registered handle in the pool, guarded as one unit.
///
/// Reads, writes, registration and handle replacement all happen while the
/// owning mutex is held, so a handle is never used while it is being swapped.
#[derive(Debug)]
pub(crate) struct RegistrationTable {
    entries: HashMap<ChannelId, ChannelEntry>,
    tokens: HashMap<Token, ChannelId>,
    next_token: usize,
}

impl Default for RegistrationTable {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            tokens: HashMap::new(),
            next_token: WAKER_TOKEN.0 + 1,
        }
    }
}

impl RegistrationTable {
    pub(crate) fn insert(&mut self, entry: ChannelEntry) {
        self.entries.insert(entry.channel.id(), entry);
    }

    pub(crate) fn get(&self, id: ChannelId) -> Option<&ChannelEntry> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ChannelId) -> Option<&mut ChannelEntry> {
        self.entries.get_mut(&id)
    }

    pub(crate) fn ids(&self) -> Vec<ChannelId> {
        let mut ids: Vec<ChannelId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Channel currently registered under `token`. Stale tokens map to nothing.
    pub(crate) fn channel_for(&self, token: Token) -> Option<ChannelId> {
        self.tokens.get(&token).copied()
    }

    fn allocate_token(&mut self) -> Token {
        loop {
            let candidate = Token(self.next_token);
            self.next_token = self.next_token.wrapping_add(1).max(WAKER_TOKEN.0 + 1);
            if !self.tokens.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Stop events for the channel's handle without dropping it.
    pub(crate) fn detach(&mut self, id: ChannelId, registry: &Registry) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if let Some(token) = entry.detach(registry) {
                self.tokens.remove(&token);
            }
        }
    }

    /// Deregister and close the channel's handle.
    pub(crate) fn release(&mut self, id: ChannelId, registry: &Registry) {
        self.detach(id, registry);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.handle = None;
            entry.pending_since = None;
            entry.connected_since = None;
        }
    }

    /// Replace the channel's handle with a freshly connected one.
    ///
    /// The previous handle is released first so at most one handle per
    /// channel is ever live. Returns the resulting state, or `None` for an
    /// unknown id.
    pub(crate) fn connect(
        &mut self,
        id: ChannelId,
        registry: &Registry,
        now: Instant,
    ) -> Option<ChannelState> {
        self.release(id, registry);
        let token = self.allocate_token();
        let entry = self.entries.get_mut(&id)?;

        entry.backoff.record_attempt(now);
        entry.channel.record_connect_attempt();

        let state = match entry.establish(registry, token, now) {
            Ok(state) => {
                self.tokens.insert(token, id);
                if state == ChannelState::Connected {
                    entry.mark_connected(now);
                    info!(channel = %id, remote = %entry.channel.remote(), "channel connected");
                } else {
                    debug!(channel = %id, remote = %entry.channel.remote(), "connect pending");
                }
                state
            }
            Err(err) => {
                entry.handle = None;
                warn!(
                    channel = %id,
                    remote = %entry.channel.remote(),
                    attempt = entry.backoff.attempts(),
                    retry_in = ?entry.backoff.current_delay(),
                    error = %err,
                    "connect failed"
                );
                ChannelState::Failed
            }
        };
        entry.channel.set_state(state);
        Some(state)
    }

    /// Remove the channel, closing its handle and queues.
    pub(crate) fn remove(&mut self, id: ChannelId, registry: &Registry) -> Option<Arc<ManagedChannel>> {
        self.release(id, registry);
        let entry = self.entries.remove(&id)?;
        entry.channel.set_state(ChannelState::Closed);
        entry.channel.write_queue().close();
        entry.channel.read_queue().close();
        Some(entry.channel)
    }
}
