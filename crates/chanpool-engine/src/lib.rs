//! Managed pool of long-lived network channels.
//!
//! A [`ChannelPool`] owns three threads. The selector loop waits for
//! readiness on every registered transport handle, moves received bytes into
//! per-channel read queues and drains write queues into the transport. The
//! reconnect supervisor revives disconnected or failed channels on a capped
//! exponential backoff. The parser worker hands received payloads to a
//! [`PayloadParser`] in arrival order.

pub mod backoff;
pub mod channel;
pub mod config;
pub mod error;
pub mod parser;
pub mod pool;
mod registry;
mod selector;
mod signal;
mod supervisor;

pub use backoff::Backoff;
pub use channel::{ChannelId, ChannelSnapshot, ChannelState, ManagedChannel};
pub use config::{BackoffConfig, ChannelConfig, PoolConfig, DEFAULT_READ_BUFFER_SIZE};
pub use error::{PoolError, Result};
pub use parser::{DiscardParser, ParseError, PayloadParser};
pub use pool::ChannelPool;
