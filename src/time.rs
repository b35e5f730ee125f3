//! Time source for the simulated cluster.
//!
//! Request receipt, version visibility and journal commit slots all read the
//! clock through [`TimeHandler`]. The binary runs on [`SystemTimeHandler`];
//! tests and the simulation harness drive a [`ManualTimeHandler`] by hand,
//! which makes every staleness window reproducible.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn plus_millis(&self, ms: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(ms))
    }
}

/// Clock shared by a backend and its anomaly model
pub trait TimeHandler: Send + Sync + 'static {
    fn now(&self) -> Timestamp;

    /// Time since `since`; zero if `since` lies in the future
    fn elapsed(&self, since: Timestamp) -> Duration {
        let now = self.now();
        Duration::from_millis(now.0.saturating_sub(since.0))
    }
}

/// Wall clock time handler
#[derive(Clone)]
pub struct SystemTimeHandler {
    /// Epoch instant for calculating timestamps
    start: Instant,
    /// Initial timestamp in milliseconds
    start_millis: u64,
}

impl Default for SystemTimeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemTimeHandler {
    pub fn new() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        // A clock before the epoch degrades to a zero origin.
        let start_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        SystemTimeHandler {
            start: Instant::now(),
            start_millis,
        }
    }
}

impl TimeHandler for SystemTimeHandler {
    fn now(&self) -> Timestamp {
        let elapsed = self.start.elapsed().as_millis() as u64;
        Timestamp(self.start_millis + elapsed)
    }
}

/// Clock that stands still until `advance_ms` moves it
///
/// Clones share one underlying counter, so a test can keep a clone and move
/// time under a handler that owns another.
#[derive(Clone)]
pub struct ManualTimeHandler {
    /// Current virtual time in milliseconds
    time_ms: Arc<AtomicU64>,
}

impl ManualTimeHandler {
    pub fn new(start_ms: u64) -> Self {
        ManualTimeHandler {
            time_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.time_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn current_ms(&self) -> u64 {
        self.time_ms.load(Ordering::SeqCst)
    }
}

impl TimeHandler for ManualTimeHandler {
    fn now(&self) -> Timestamp {
        Timestamp(self.time_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_handler_advances() {
        let clock = SystemTimeHandler::new();
        let t1 = clock.now();
        std::thread::sleep(Duration::from_millis(10));
        assert!(clock.now().0 >= t1.0 + 10);
    }

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualTimeHandler::new(1000);
        let shared = clock.clone();
        assert_eq!(clock.now(), clock.now());

        clock.advance_ms(250);
        assert_eq!(shared.now(), Timestamp(1250));
        assert_eq!(shared.current_ms(), 1250);
        assert_eq!(shared.elapsed(Timestamp(1000)), Duration::from_millis(250));
        assert_eq!(shared.elapsed(Timestamp(2000)), Duration::ZERO);
    }

    #[test]
    fn test_plus_millis_saturates() {
        assert_eq!(Timestamp(10).plus_millis(5), Timestamp(15));
        assert_eq!(Timestamp(10).plus_millis(u64::MAX), Timestamp(u64::MAX));
    }
}
