//! Per-client request counting over a fixed time window.
//!
//! Each client (keyed by remote address) owns one counter entry holding a
//! count and the instant its window started. The count only ever grows within
//! a window; once the window duration has elapsed the entry resets to zero
//! with a fresh start time. Reset is applied lazily, on the next read or
//! increment, so idle entries cost nothing.
//!
//! Like the cache, the counter is injected into [`RateLimitStage`] rather
//! than shared as ambient state.
//!
//! [`RateLimitStage`]: crate::stages::RateLimitStage

use std::net::IpAddr;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Default accumulation window: 1 hour.
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Default per-window request threshold.
pub const DEFAULT_RATE_LIMIT_THRESHOLD: u64 = 100;

#[derive(Debug)]
struct CounterWindow {
    count: u64,
    started_at: Instant,
}

/// A concurrent per-client fixed-window request counter.
///
/// Entries mutate under per-key locks only; counting one client never blocks
/// another.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use gantry::limit::RateLimitCounter;
///
/// let counter = RateLimitCounter::new(Duration::from_secs(3600));
/// let client = "10.0.0.1".parse().unwrap();
///
/// assert_eq!(counter.count(client), 0);
/// assert_eq!(counter.record(client), 1);
/// assert_eq!(counter.count(client), 1);
/// ```
#[derive(Debug)]
pub struct RateLimitCounter {
    entries: DashMap<IpAddr, CounterWindow>,
    window: Duration,
}

impl RateLimitCounter {
    /// Creates a counter with the given window duration.
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    /// Creates a counter with the default 1-hour window.
    pub fn with_default_window() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_WINDOW)
    }

    /// Returns the window duration.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the client's count within its current window.
    ///
    /// A missing entry, or one whose window has fully elapsed, reads as zero.
    pub fn count(&self, client: IpAddr) -> u64 {
        match self.entries.get(&client) {
            Some(entry) if entry.started_at.elapsed() < self.window => entry.count,
            _ => 0,
        }
    }

    /// Records one request from the client and returns the new count.
    ///
    /// If the entry's window has elapsed it is reset to zero with a new start
    /// time before the increment is applied.
    pub fn record(&self, client: IpAddr) -> u64 {
        let mut entry = self.entries.entry(client).or_insert_with(|| CounterWindow {
            count: 0,
            started_at: Instant::now(),
        });
        if entry.started_at.elapsed() >= self.window {
            entry.count = 0;
            entry.started_at = Instant::now();
        }
        entry.count += 1;
        entry.count
    }

    /// Drops entries whose window has elapsed and returns how many were
    /// removed. Optional housekeeping; reads already treat stale windows as
    /// zero.
    pub fn sweep_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.started_at.elapsed() < self.window);
        before - self.entries.len()
    }

    /// Returns the number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.entries.len()
    }
}

impl Default for RateLimitCounter {
    fn default() -> Self {
        Self::with_default_window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn client(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn counts_are_monotone_within_a_window() {
        let counter = RateLimitCounter::with_default_window();
        let ip = client("10.0.0.1");
        for expected in 1..=5 {
            assert_eq!(counter.record(ip), expected);
        }
        assert_eq!(counter.count(ip), 5);
    }

    #[test]
    fn clients_are_independent() {
        let counter = RateLimitCounter::with_default_window();
        counter.record(client("10.0.0.1"));
        counter.record(client("10.0.0.1"));
        counter.record(client("10.0.0.2"));
        assert_eq!(counter.count(client("10.0.0.1")), 2);
        assert_eq!(counter.count(client("10.0.0.2")), 1);
    }

    #[test]
    fn elapsed_window_reads_as_zero_and_resets_on_record() {
        let counter = RateLimitCounter::new(Duration::from_millis(10));
        let ip = client("10.0.0.1");
        counter.record(ip);
        counter.record(ip);

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(counter.count(ip), 0);
        // First record after the window starts a fresh count.
        assert_eq!(counter.record(ip), 1);
    }

    #[test]
    fn sweep_drops_stale_entries() {
        let counter = RateLimitCounter::new(Duration::from_millis(10));
        counter.record(client("10.0.0.1"));
        std::thread::sleep(Duration::from_millis(15));
        counter.record(client("10.0.0.2"));

        assert_eq!(counter.sweep_expired(), 1);
        assert_eq!(counter.tracked_clients(), 1);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let counter = Arc::new(RateLimitCounter::with_default_window());
        let ip = client("10.0.0.1");
        let mut handles = Vec::new();
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    counter.record(ip);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.count(ip), 400);
    }
}
