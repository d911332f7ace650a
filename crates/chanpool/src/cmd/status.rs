use std::thread;
use std::time::{Duration, Instant};

use chanpool_engine::ChannelState;

use crate::cmd::{parse_duration, pool_config, start_pool, StatusArgs};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_snapshots, OutputFormat};

pub fn run(args: StatusArgs, format: OutputFormat) -> CliResult<i32> {
    let window = parse_duration(&args.duration)?;
    let config = pool_config(&args.pool, &args.addrs)?;
    let (pool, _inbox) = start_pool(config)?;

    let deadline = Instant::now() + window;
    while Instant::now() < deadline && !all_connected(&pool) {
        thread::sleep(Duration::from_millis(10));
    }

    let snapshots = pool.snapshots();
    pool.shutdown();
    print_snapshots(&snapshots, format);

    if snapshots
        .iter()
        .all(|snapshot| snapshot.state == ChannelState::Connected)
    {
        Ok(SUCCESS)
    } else {
        Ok(HEALTH_CHECK_FAILED)
    }
}

fn all_connected(pool: &chanpool_engine::ChannelPool) -> bool {
    pool.snapshots()
        .iter()
        .all(|snapshot| snapshot.state == ChannelState::Connected)
}
