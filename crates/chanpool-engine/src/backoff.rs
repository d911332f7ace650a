use std::time::{Duration, Instant};

use crate::config::BackoffConfig;

/// Per-channel reconnect schedule.
///
/// Delays never decrease while attempts keep failing and never exceed the
/// configured cap. There is no attempt limit.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: u32,
    attempts: u32,
    last_attempt: Option<Instant>,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let initial = config.initial_delay();
        Self {
            initial,
            max: config.max_delay().max(initial),
            multiplier: config.multiplier.max(1),
            attempts: 0,
            last_attempt: None,
        }
    }

    /// Delay required after the most recent attempt before the next one.
    pub fn current_delay(&self) -> Duration {
        self.delay_for(self.attempts.saturating_sub(1))
    }

    /// Delay after the `n`-th consecutive failed attempt (0-based).
    pub fn delay_for(&self, n: u32) -> Duration {
        let mut delay = self.initial;
        if self.multiplier == 1 {
            return delay.min(self.max);
        }
        for _ in 0..n {
            if delay >= self.max {
                break;
            }
            delay = delay.saturating_mul(self.multiplier);
        }
        delay.min(self.max)
    }

    /// Whether a new attempt may start at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_attempt {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.current_delay(),
        }
    }

    /// Record that an attempt started at `now`.
    pub fn record_attempt(&mut self, now: Instant) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt = Some(now);
    }

    /// Forget failures once a connection has proven healthy.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_attempt = None;
    }

    /// Consecutive attempts since the channel was last healthy.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial_ms: u64, max_ms: u64, multiplier: u32) -> BackoffConfig {
        BackoffConfig {
            initial_delay_ms: initial_ms,
            max_delay_ms: max_ms,
            multiplier,
        }
    }

    #[test]
    fn delays_double_until_cap() {
        let backoff = Backoff::new(&config(100, 1_000, 2));
        let delays: Vec<u128> = (0..8).map(|n| backoff.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_000, 1_000, 1_000, 1_000]);
    }

    #[test]
    fn delays_are_monotonic_and_bounded() {
        let backoff = Backoff::new(&config(7, 5_000, 3));
        let mut previous = Duration::ZERO;
        for n in 0..200 {
            let delay = backoff.delay_for(n);
            assert!(delay >= previous, "delay shrank at attempt {n}");
            assert!(delay <= Duration::from_millis(5_000));
            previous = delay;
        }
    }

    #[test]
    fn huge_attempt_counts_do_not_overflow() {
        let backoff = Backoff::new(&config(1, u64::MAX / 2, 10));
        assert!(backoff.delay_for(u32::MAX) <= Duration::from_millis(u64::MAX / 2));
    }

    #[test]
    fn fixed_interval() {
        let backoff = Backoff::new(&BackoffConfig::fixed(Duration::from_millis(50)));
        assert_eq!(backoff.delay_for(0), Duration::from_millis(50));
        assert_eq!(backoff.delay_for(10), Duration::from_millis(50));
    }

    #[test]
    fn due_tracking() {
        let mut backoff = Backoff::new(&config(100, 1_000, 2));
        let start = Instant::now();
        assert!(backoff.is_due(start));

        backoff.record_attempt(start);
        assert_eq!(backoff.attempts(), 1);
        assert!(!backoff.is_due(start + Duration::from_millis(50)));
        assert!(backoff.is_due(start + Duration::from_millis(100)));

        backoff.record_attempt(start + Duration::from_millis(100));
        assert_eq!(backoff.current_delay(), Duration::from_millis(200));
        assert!(!backoff.is_due(start + Duration::from_millis(250)));
        assert!(backoff.is_due(start + Duration::from_millis(300)));

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(backoff.is_due(start));
    }
}
