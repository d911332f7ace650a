use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::channel::ChannelState;
use crate::pool::PoolShared;

/// Periodically revives disconnected and failed channels.
///
/// Retries never give up. Each channel waits out its own backoff before the
/// next attempt. The backoff only resets once a connection carries traffic
/// or stays up for a full backoff period, so a remote that accepts and drops
/// right away is retried at growing intervals.
pub(crate) struct ReconnectSupervisor {
    shared: Arc<PoolShared>,
}

impl ReconnectSupervisor {
    pub(crate) fn new(shared: Arc<PoolShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn run(self) {
        let interval = self.shared.config.reconnect_interval();
        info!(interval = ?interval, "reconnect supervisor started");

        while self.shared.is_running() {
            self.shared.supervisor_wakeup.wait_timeout(interval);
            if !self.shared.is_running() {
                break;
            }
            let revived = self.pass(Instant::now());
            if revived > 0 {
                self.shared.wake_selector();
            }
        }

        info!("reconnect supervisor stopped");
    }

    /// One sweep over the registration table. Returns how many channels got
    /// a new connection attempt.
    pub(crate) fn pass(&self, now: Instant) -> usize {
        let mut table = self.shared.table.lock();
        let mut attempted = 0;
        for id in table.ids() {
            let due = match table.get(id) {
                Some(entry) => {
                    entry.channel.state().needs_reconnect() && entry.backoff.is_due(now)
                }
                None => false,
            };
            if !due {
                continue;
            }
            debug!(channel = %id, "attempting reconnect");
            match table.connect(id, &self.shared.registry, now) {
                Some(ChannelState::Connected) => info!(channel = %id, "channel reconnected"),
                Some(_) => {}
                None => warn!(channel = %id, "channel vanished during reconnect"),
            }
            attempted += 1;
        }
        attempted
    }
}
