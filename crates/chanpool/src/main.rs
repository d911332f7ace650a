mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chanpool", version, about = "Managed network channel pool CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "chanpool",
            "send",
            "127.0.0.1:7000",
            "--data",
            "hello",
            "--keep-alive",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.addr.port(), 7000);
                assert!(args.pool.keep_alive);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "chanpool",
            "send",
            "127.0.0.1:7000",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_watch_with_many_addresses() {
        let cli = Cli::try_parse_from([
            "chanpool",
            "watch",
            "127.0.0.1:7000",
            "[::1]:7001",
            "--transport",
            "udp",
            "--count",
            "3",
        ])
        .expect("watch args should parse");

        match cli.command {
            Command::Watch(args) => {
                assert_eq!(args.addrs.len(), 2);
                assert_eq!(args.count, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_address() {
        let err = Cli::try_parse_from(["chanpool", "status", "not-an-address"])
            .expect_err("bad address should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
