use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chanpool_engine::{
    ChannelConfig, ChannelId, ChannelPool, ChannelState, ParseError, PoolConfig,
};
use chanpool_transport::TransportKind;
use clap::{Args, Subcommand, ValueEnum};

use crate::exit::{pool_error, CliError, CliResult, INTERNAL, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod status;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect to remotes and print every payload they send.
    Watch(WatchArgs),
    /// Send a single payload.
    Send(SendArgs),
    /// Connect to remotes and print channel status.
    Status(StatusArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Watch(args) => watch::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Status(args) => status::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum TransportArg {
    #[default]
    Tcp,
    Udp,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Tcp => TransportKind::Tcp,
            TransportArg::Udp => TransportKind::Udp,
        }
    }
}

/// Pool options shared by every connecting command.
#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    /// JSON pool configuration. Addresses on the command line are added to its channels.
    #[arg(long, value_name = "FILE", env = "CHANPOOL_CONFIG")]
    pub config: Option<PathBuf>,
    /// Transport for addresses given on the command line.
    #[arg(long, value_enum, default_value = "tcp")]
    pub transport: TransportArg,
    /// Enable keep-alive probing on command-line channels.
    #[arg(long)]
    pub keep_alive: bool,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Remote addresses to connect to.
    pub addrs: Vec<SocketAddr>,
    #[command(flatten)]
    pub pool: PoolArgs,
    /// Exit after receiving N payloads.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long (e.g. 30s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Remote address to connect to.
    pub addr: SocketAddr,
    #[command(flatten)]
    pub pool: PoolArgs,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response payload and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Maximum time to wait for the connection (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Remote addresses to connect to.
    pub addrs: Vec<SocketAddr>,
    #[command(flatten)]
    pub pool: PoolArgs,
    /// How long to let channels connect before reporting (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub duration: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Received payloads forwarded from the pool's parser thread.
pub type Inbox = Receiver<(ChannelId, Bytes)>;

/// Load the configured pool and append command-line channels.
pub fn pool_config(args: &PoolArgs, addrs: &[SocketAddr]) -> CliResult<PoolConfig> {
    let mut config = match &args.config {
        Some(path) => PoolConfig::from_file(path)
            .map_err(|err| pool_error(&format!("failed loading {}", path.display()), err))?,
        None => PoolConfig::default(),
    };
    config.channels.extend(addrs.iter().map(|addr| ChannelConfig {
        name: None,
        remote: *addr,
        keep_alive: args.keep_alive,
        transport: args.transport.into(),
    }));
    if config.channels.is_empty() {
        return Err(CliError::new(
            USAGE,
            "no channels: pass an address or a --config that lists channels",
        ));
    }
    Ok(config)
}

/// Start a pool whose parser forwards every payload to the returned inbox.
pub fn start_pool(config: PoolConfig) -> CliResult<(ChannelPool, Inbox)> {
    let (tx, rx) = mpsc::channel();
    let parser = move |channel: ChannelId, payload: Bytes| -> Result<(), ParseError> {
        tx.send((channel, payload))?;
        Ok(())
    };
    let pool =
        ChannelPool::start(config, parser).map_err(|err| pool_error("pool start failed", err))?;
    Ok((pool, rx))
}

pub fn wait_connected(pool: &ChannelPool, id: ChannelId, timeout: Duration) -> CliResult<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let state = pool
            .state(id)
            .map_err(|err| pool_error("state lookup failed", err))?;
        if state == ChannelState::Connected {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(CliError::new(
                TIMEOUT,
                format!("channel {id} not connected within {timeout:?} (state: {state})"),
            ));
        }
        thread::sleep(Duration::from_millis(10));
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("  ").is_err());
    }

    #[test]
    fn command_line_channels_extend_defaults() {
        let args = PoolArgs {
            config: None,
            transport: TransportArg::Udp,
            keep_alive: true,
        };
        let addr: SocketAddr = "127.0.0.1:7000".parse().unwrap();
        let config = pool_config(&args, &[addr]).unwrap();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].transport, TransportKind::Udp);
        assert!(config.channels[0].keep_alive);
    }

    #[test]
    fn no_channels_is_usage_error() {
        let args = PoolArgs {
            config: None,
            transport: TransportArg::Tcp,
            keep_alive: false,
        };
        assert_eq!(pool_config(&args, &[]).unwrap_err().code, USAGE);
    }
}
