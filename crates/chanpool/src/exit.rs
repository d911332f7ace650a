use std::fmt;
use std::io;

use chanpool_engine::PoolError;
use chanpool_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const BACKPRESSURE: i32 = 75;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        io::ErrorKind::NotFound => USAGE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn pool_error(context: &str, err: PoolError) -> CliError {
    match err {
        PoolError::Transport(err) => transport_error(context, err),
        PoolError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PoolError::QueueFull { .. } => CliError::new(BACKPRESSURE, format!("{context}: {err}")),
        PoolError::InvalidConfig(_) | PoolError::Json(_) | PoolError::PayloadRejected(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        PoolError::ChannelClosed(_) | PoolError::Discarded(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        PoolError::UnknownChannel(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chanpool_engine::ChannelId;

    use super::*;

    #[test]
    fn maps_pool_errors_to_codes() {
        let id = ChannelId::new(1);
        let cases = [
            (
                PoolError::Timeout {
                    channel: id,
                    timeout: Duration::from_secs(1),
                },
                TIMEOUT,
            ),
            (
                PoolError::QueueFull {
                    channel: id,
                    capacity: 4,
                },
                BACKPRESSURE,
            ),
            (PoolError::InvalidConfig("x".into()), DATA_INVALID),
            (PoolError::PayloadRejected(id), DATA_INVALID),
            (PoolError::ChannelClosed(id), FAILURE),
            (PoolError::UnknownChannel(id), USAGE),
        ];
        for (err, code) in cases {
            assert_eq!(pool_error("op", err).code, code);
        }
    }

    #[test]
    fn refused_connect_is_a_failure() {
        let err = TransportError::Connect {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let cli = pool_error("connect", PoolError::Transport(err));
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.starts_with("connect: "));
    }
}
