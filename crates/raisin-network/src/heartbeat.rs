//! Link Monitor - tracks inbound traffic to detect a silent peer
//!
//! Time is kept as microseconds since a process-wide monotonic anchor so it
//! can live in an `AtomicU64` and be read without locks.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static APP_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u64
}

/// Link health monitor
///
/// Any inbound frame (telemetry, response or heartbeat) counts as activity.
pub struct LinkMonitor {
    last_activity: AtomicU64,
    timeout: Option<Duration>,
}

impl LinkMonitor {
    /// `timeout = None` disables the check (`is_alive()` is always true).
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            last_activity: AtomicU64::new(monotonic_micros()),
            timeout,
        }
    }

    pub fn register_activity(&self) {
        self.last_activity.store(monotonic_micros(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        match self.timeout {
            Some(timeout) => self.time_since_last_activity() < timeout,
            None => true,
        }
    }

    pub fn time_since_last_activity(&self) -> Duration {
        let last_us = self.last_activity.load(Ordering::Relaxed);
        Duration::from_micros(monotonic_micros().saturating_sub(last_us))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_initially_alive() {
        let monitor = LinkMonitor::new(Some(Duration::from_secs(1)));
        assert!(monitor.is_alive());
    }

    #[test]
    fn test_times_out_without_activity() {
        let monitor = LinkMonitor::new(Some(Duration::from_millis(30)));
        thread::sleep(Duration::from_millis(60));
        assert!(!monitor.is_alive());

        monitor.register_activity();
        assert!(monitor.is_alive());
    }

    #[test]
    fn test_disabled_monitor_never_expires() {
        let monitor = LinkMonitor::new(None);
        thread::sleep(Duration::from_millis(5));
        assert!(monitor.is_alive());
        assert!(monitor.time_since_last_activity() >= Duration::from_millis(5));
    }
}
