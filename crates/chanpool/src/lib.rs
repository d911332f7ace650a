//! Pool of long-lived, self-reconnecting network channels.
//!
//! chanpool keeps a set of TCP (or connected UDP) channels open, multiplexes
//! their I/O on one readiness selector, reconnects them with capped
//! exponential backoff and hands received payloads to a single parser.
//!
//! # Crate Structure
//!
//! - [`transport`]: channel abstraction over non-blocking sockets
//! - [`buffer`]: buffer elements and bounded read/write queues
//! - [`engine`]: the pool, its selector loop, reconnect supervisor and parser worker
//!
//! ```no_run
//! use chanpool::engine::{ChannelConfig, ChannelPool, DiscardParser, PoolConfig};
//!
//! let pool = ChannelPool::start(PoolConfig::default(), DiscardParser)?;
//! let id = pool.add_channel(ChannelConfig::tcp("127.0.0.1:7000".parse().unwrap()))?;
//! pool.submit(id, &b"PING"[..], true)?;
//! # Ok::<(), chanpool::engine::PoolError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use chanpool_transport::*;
}

/// Re-export buffer types.
pub mod buffer {
    pub use chanpool_buffer::*;
}

/// Re-export pool types.
pub mod engine {
    pub use chanpool_engine::*;
}

pub use chanpool_engine::{
    ChannelConfig, ChannelId, ChannelPool, ChannelState, PayloadParser, PoolConfig, PoolError,
};
