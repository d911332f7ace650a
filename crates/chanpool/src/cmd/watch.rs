use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chanpool_engine::ChannelId;

use crate::cmd::{install_ctrlc_handler, parse_duration, pool_config, start_pool, WatchArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_payload, OutputFormat, Received};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let config = pool_config(&args.pool, &args.addrs)?;
    let deadline = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|duration| Instant::now() + duration);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (pool, inbox) = start_pool(config)?;
    let names: HashMap<ChannelId, String> = pool
        .snapshots()
        .into_iter()
        .map(|snapshot| (snapshot.id, snapshot.name))
        .collect();

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        let (channel, payload) = match inbox.recv_timeout(POLL_INTERVAL) {
            Ok(received) => received,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let name = names.get(&channel).map(String::as_str).unwrap_or("unknown");
        print_payload(
            &Received {
                channel,
                name,
                payload: &payload,
            },
            format,
        );
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    pool.shutdown();
    Ok(SUCCESS)
}
