use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use chanpool_buffer::DEFAULT_QUEUE_CAPACITY;
use chanpool_transport::TransportKind;
use serde::{Deserialize, Serialize};

use crate::error::{PoolError, Result};

/// Default size of the selector's per-read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Capped exponential backoff between reconnect attempts.
///
/// The delay before attempt `n` (0-based) is
/// `min(initial_delay * multiplier^n, max_delay)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any retry delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor per failed attempt. `1` gives a fixed interval.
    pub multiplier: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2,
        }
    }
}

impl BackoffConfig {
    /// Fixed-interval retry.
    pub fn fixed(delay: Duration) -> Self {
        let ms = duration_ms(delay);
        Self {
            initial_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Reject parameters that would make the delay sequence shrink or vanish.
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(PoolError::InvalidConfig(
                "backoff.initial_delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(PoolError::InvalidConfig(format!(
                "backoff.max_delay_ms ({}) must not be below initial_delay_ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        if self.multiplier == 0 {
            return Err(PoolError::InvalidConfig(
                "backoff.multiplier must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// One remote endpoint managed by the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Label used in logs. Defaults to the channel id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remote address to connect to.
    pub remote: SocketAddr,
    /// Enable keep-alive probing on every (re)connected handle.
    #[serde(default)]
    pub keep_alive: bool,
    /// Transport variant.
    #[serde(default)]
    pub transport: TransportKind,
}

impl ChannelConfig {
    /// A TCP channel to `remote` with keep-alive off.
    pub fn tcp(remote: SocketAddr) -> Self {
        Self {
            name: None,
            remote,
            keep_alive: false,
            transport: TransportKind::Tcp,
        }
    }

    /// A connected UDP channel to `remote`.
    pub fn udp(remote: SocketAddr) -> Self {
        Self {
            transport: TransportKind::Udp,
            ..Self::tcp(remote)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

/// Pool-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on one selector readiness wait, in milliseconds.
    pub select_timeout_ms: u64,
    /// Interval between reconnect supervisor passes, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// How long a connection may stay pending before it is failed, in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long a blocking submit waits for its write, in milliseconds.
    pub blocking_write_timeout_ms: u64,
    /// Size of the buffer each readable event reads into. Datagram channels
    /// always read with room for the largest datagram.
    pub read_buffer_size: usize,
    /// Elements held per read queue before the oldest is dropped.
    pub read_queue_capacity: usize,
    /// Elements held per write queue before submits are rejected.
    pub write_queue_capacity: usize,
    /// Reconnect backoff.
    pub backoff: BackoffConfig,
    /// Channels added when the pool starts.
    pub channels: Vec<ChannelConfig>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            select_timeout_ms: 100,
            reconnect_interval_ms: 250,
            connect_timeout_ms: 10_000,
            blocking_write_timeout_ms: 5_000,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            read_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backoff: BackoffConfig::default(),
            channels: Vec::new(),
        }
    }
}

impl PoolConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PoolError::InvalidConfig(format!("failed reading {}: {err}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("select_timeout_ms", self.select_timeout_ms),
            ("reconnect_interval_ms", self.reconnect_interval_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("blocking_write_timeout_ms", self.blocking_write_timeout_ms),
            ("read_buffer_size", self.read_buffer_size as u64),
            ("read_queue_capacity", self.read_queue_capacity as u64),
            ("write_queue_capacity", self.write_queue_capacity as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(PoolError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        self.backoff.validate()
    }

    pub fn select_timeout(&self) -> Duration {
        Duration::from_millis(self.select_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn blocking_write_timeout(&self) -> Duration {
        Duration::from_millis(self.blocking_write_timeout_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PoolConfig::default().validate().unwrap();
        assert_eq!(PoolConfig::default().select_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let config = PoolConfig::from_json_str(
            r#"{
                "reconnect_interval_ms": 50,
                "backoff": { "initial_delay_ms": 200 },
                "channels": [
                    { "remote": "127.0.0.1:7000", "keep_alive": true },
                    { "name": "sensor", "remote": "[::1]:7001", "transport": "udp" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.reconnect_interval(), Duration::from_millis(50));
        assert_eq!(config.backoff.initial_delay_ms, 200);
        assert_eq!(config.backoff.max_delay_ms, 60_000);
        assert_eq!(config.channels.len(), 2);
        assert!(config.channels[0].keep_alive);
        assert_eq!(config.channels[0].transport, TransportKind::Tcp);
        assert_eq!(config.channels[1].name.as_deref(), Some("sensor"));
        assert_eq!(config.channels[1].transport, TransportKind::Udp);
    }

    #[test]
    fn rejects_zero_values() {
        let err = PoolConfig::from_json_str(r#"{ "read_buffer_size": 0 }"#).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(msg) if msg.contains("read_buffer_size")));
    }

    #[test]
    fn rejects_shrinking_backoff() {
        let backoff = BackoffConfig {
            initial_delay_ms: 500,
            max_delay_ms: 100,
            multiplier: 2,
        };
        assert!(backoff.validate().is_err());

        let backoff = BackoffConfig {
            multiplier: 0,
            ..BackoffConfig::default()
        };
        assert!(backoff.validate().is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = PoolConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, PoolError::Json(_)));
    }

    #[test]
    fn fixed_backoff_has_equal_bounds() {
        let backoff = BackoffConfig::fixed(Duration::from_millis(300));
        assert_eq!(backoff.initial_delay(), backoff.max_delay());
        assert_eq!(backoff.multiplier, 1);
        backoff.validate().unwrap();
    }

    #[test]
    fn channel_builders() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let channel = ChannelConfig::tcp(addr).with_name("hvac").with_keep_alive(true);
        assert_eq!(channel.name.as_deref(), Some("hvac"));
        assert!(channel.keep_alive);
        assert_eq!(ChannelConfig::udp(addr).transport, TransportKind::Udp);
    }
}
