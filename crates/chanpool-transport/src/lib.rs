//! Non-blocking channel capability interface.
//!
//! Provides a unified interface over connection-oriented socket transports:
//! - TCP stream sockets
//! - Connected UDP datagram sockets
//!
//! This is the lowest layer of chanpool. The selector loop in
//! `chanpool-engine` drives every handle through the [`Channel`] trait and
//! never blocks on any of its operations.

pub mod error;
pub mod tcp;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use tcp::{TcpChannel, TcpTransport};
pub use traits::{transport_for, Channel, ReadOutcome, Transport, TransportKind};
pub use udp::{UdpChannel, UdpTransport, MAX_DATAGRAM_SIZE};
