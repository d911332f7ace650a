use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Edge-style wakeup shared between worker threads.
///
/// `notify` is sticky: a notification raised while nobody waits is consumed
/// by the next `wait_timeout`.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn notify(&self) {
        *self.raised.lock() = true;
        self.cond.notify_all();
    }

    /// Wait for a notification or `timeout`. Returns whether one arrived.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut raised = self.raised.lock();
        if !*raised {
            let _ = self.cond.wait_for(&mut raised, timeout);
        }
        std::mem::replace(&mut *raised, false)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn notification_before_wait_is_kept() {
        let signal = Signal::default();
        signal.notify();
        assert!(signal.wait_timeout(Duration::from_millis(1)));
        assert!(!signal.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn wakes_waiting_thread() {
        let signal = Arc::new(Signal::default());
        let notifier = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            notifier.notify();
        });
        assert!(signal.wait_timeout(Duration::from_secs(5)));
        handle.join().unwrap();
    }
}
