use std::fs;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chanpool_engine::ChannelId;

use crate::cmd::{parse_duration, pool_config, start_pool, wait_connected, Inbox, SendArgs};
use crate::exit::{io_error, pool_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_payload, OutputFormat, Received};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;
    let config = pool_config(&args.pool, &[args.addr])?;

    let (pool, inbox) = start_pool(config)?;
    // Command-line channels are added after any configured ones.
    let id = pool
        .channel_ids()
        .last()
        .copied()
        .ok_or_else(|| CliError::new(FAILURE, "pool has no channels"))?;

    wait_connected(&pool, id, connect_timeout)?;
    pool.submit(id, payload, true)
        .map_err(|err| pool_error("send failed", err))?;

    if args.wait {
        let response = wait_for_response(&inbox, id, wait_timeout)?;
        let name = pool
            .snapshot(id)
            .map(|snapshot| snapshot.name)
            .unwrap_or_else(|_| id.to_string());
        print_payload(
            &Received {
                channel: id,
                name: &name,
                payload: &response,
            },
            format,
        );
    }

    pool.shutdown();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Bytes> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(Bytes::from(json.clone().into_bytes()));
    }
    if let Some(data) = &args.data {
        return Ok(Bytes::from(data.clone().into_bytes()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Bytes::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Bytes::new())
}

/// Next payload received on `channel`. Payloads from other channels are skipped.
fn wait_for_response(inbox: &Inbox, channel: ChannelId, timeout: Duration) -> CliResult<Bytes> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match inbox.recv_timeout(remaining) {
            Ok((from, payload)) if from == channel => return Ok(payload),
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no response on {channel} within {timeout:?}"),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(FAILURE, "pool stopped before a response arrived"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn wait_for_response_skips_other_channels() {
        let (tx, rx) = mpsc::channel();
        tx.send((ChannelId::new(2), Bytes::from_static(b"noise"))).unwrap();
        tx.send((ChannelId::new(1), Bytes::from_static(b"PONG"))).unwrap();

        let payload = wait_for_response(&rx, ChannelId::new(1), Duration::from_secs(1)).unwrap();
        assert_eq!(payload, Bytes::from_static(b"PONG"));
    }

    #[test]
    fn wait_for_response_times_out() {
        let (_tx, rx) = mpsc::channel::<(ChannelId, Bytes)>();
        let err = wait_for_response(&rx, ChannelId::new(1), Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn wait_for_response_reports_stopped_pool() {
        let (tx, rx) = mpsc::channel::<(ChannelId, Bytes)>();
        drop(tx);
        let err = wait_for_response(&rx, ChannelId::new(1), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code, FAILURE);
    }
}
