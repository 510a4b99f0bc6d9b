//! Sliding-window quota accounting.
//!
//! A [`Quota`] says "at most `max_items` per rolling `window`". The
//! [`QuotaTracker`] remembers how many items were submitted and when, and answers
//! how many more may be submitted right now.
//!
//! Semantics:
//! - An entry recorded at `t` counts against the quota while `t + window >= now`
//!   and stops counting once `t + window < now`.
//! - Entries are pruned lazily, from the front, whenever capacity is computed.
//! - Bursts of up to `max_items` are possible at window edges. This is a true
//!   sliding window, matching what the acceptor enforces, not a leaky bucket.
//!
//! Invariant: as long as every recorded count was at most the capacity reported
//! for the same instant, the counts recorded within any `window`-long span never
//! exceed `max_items`.

use crate::error::ConfigError;
use std::collections::VecDeque;
use std::time::Duration;

/// Admission limit advertised by the acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    max_items: u64,
    window: Duration,
}

impl Quota {
    /// Create a quota; both values must be non-zero.
    pub fn new(max_items: u64, window: Duration) -> Result<Self, ConfigError> {
        if max_items == 0 {
            return Err(ConfigError::InvalidQuotaCount(max_items));
        }
        if window.is_zero() {
            return Err(ConfigError::InvalidQuotaWindow(window));
        }
        Ok(Self { max_items, window })
    }

    pub fn max_items(&self) -> u64 {
        self.max_items
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn window_nanos(&self) -> u64 {
        u64::try_from(self.window.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// "`count` items were submitted at `at_nanos`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    pub at_nanos: u64,
    pub count: u64,
}

/// Sliding window of submissions checked against a [`Quota`].
///
/// Owned by a single drain loop; it carries no synchronization.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    quota: Quota,
    entries: VecDeque<WindowEntry>,
}

impl QuotaTracker {
    pub fn new(quota: Quota) -> Self {
        Self { quota, entries: VecDeque::new() }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    /// Prune expired entries and return how many items may still be submitted.
    pub fn remaining_capacity(&mut self, now_nanos: u64) -> u64 {
        let used = self.in_window(now_nanos);
        self.quota.max_items.saturating_sub(used)
    }

    /// Record that `count` items were submitted at `now_nanos`.
    pub fn record(&mut self, now_nanos: u64, count: u64) {
        if count == 0 {
            return;
        }
        self.entries.push_back(WindowEntry { at_nanos: now_nanos, count });
    }

    /// Prune expired entries and sum what still counts.
    pub fn in_window(&mut self, now_nanos: u64) -> u64 {
        self.prune(now_nanos);
        self.entries.iter().map(|e| e.count).fold(0, u64::saturating_add)
    }

    /// Time until the oldest live entry stops counting, if any entry is live.
    ///
    /// This is the earliest instant at which remaining capacity can grow.
    pub fn next_release(&mut self, now_nanos: u64) -> Option<Duration> {
        self.prune(now_nanos);
        let front = self.entries.front()?;
        let released_at = front.at_nanos.saturating_add(self.quota.window_nanos()).saturating_add(1);
        Some(Duration::from_nanos(released_at.saturating_sub(now_nanos)))
    }

    /// Live entries, oldest first (as of the last prune).
    pub fn entries(&self) -> impl Iterator<Item = &WindowEntry> {
        self.entries.iter()
    }

    fn prune(&mut self, now_nanos: u64) {
        let window = self.quota.window_nanos();
        while let Some(front) = self.entries.front() {
            if front.at_nanos.saturating_add(window) < now_nanos {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: u64 = 1_000_000_000;

    fn tracker(n: u64, secs: u64) -> QuotaTracker {
        QuotaTracker::new(Quota::new(n, Duration::from_secs(secs)).unwrap())
    }

    #[test]
    fn rejects_zero_quota() {
        assert_eq!(
            Quota::new(0, Duration::from_secs(1)),
            Err(ConfigError::InvalidQuotaCount(0))
        );
        assert_eq!(Quota::new(1, Duration::ZERO), Err(ConfigError::InvalidQuotaWindow(Duration::ZERO)));
    }

    #[test]
    fn fresh_tracker_has_full_capacity() {
        let mut t = tracker(10, 15);
        assert_eq!(t.remaining_capacity(0), 10);
        assert_eq!(t.next_release(0), None);
    }

    #[test]
    fn records_reduce_capacity_and_clamp_at_zero() {
        let mut t = tracker(10, 15);
        t.record(SEC, 4);
        assert_eq!(t.remaining_capacity(SEC), 6);
        t.record(2 * SEC, 6);
        assert_eq!(t.remaining_capacity(2 * SEC), 0);
        // Over-recording never underflows.
        t.record(3 * SEC, 5);
        assert_eq!(t.remaining_capacity(3 * SEC), 0);
    }

    #[test]
    fn huge_records_saturate_instead_of_overflowing() {
        let mut t = tracker(10, 15);
        t.record(SEC, u64::MAX);
        t.record(2 * SEC, u64::MAX);
        assert_eq!(t.in_window(2 * SEC), u64::MAX);
        assert_eq!(t.remaining_capacity(2 * SEC), 0);
    }

    #[test]
    fn entry_counts_until_strictly_older_than_window() {
        let mut t = tracker(10, 15);
        t.record(0, 10);
        assert_eq!(t.remaining_capacity(15 * SEC), 0, "boundary instant still counts");
        assert_eq!(t.remaining_capacity(15 * SEC + 1), 10);
        assert_eq!(t.entries().count(), 0, "expired entry pruned");
    }

    #[test]
    fn entries_expire_independently() {
        let mut t = tracker(10, 15);
        t.record(0, 3);
        t.record(5 * SEC, 7);
        assert_eq!(t.remaining_capacity(10 * SEC), 0);
        assert_eq!(t.remaining_capacity(16 * SEC), 3);
        assert_eq!(t.remaining_capacity(21 * SEC), 10);
    }

    #[test]
    fn next_release_points_past_oldest_entry() {
        let mut t = tracker(10, 15);
        t.record(2 * SEC, 10);
        let wait = t.next_release(4 * SEC).unwrap();
        assert_eq!(wait, Duration::from_nanos(13 * SEC + 1));
        assert_eq!(t.remaining_capacity(4 * SEC + wait.as_nanos() as u64), 10);
    }

    #[test]
    fn zero_count_records_are_ignored() {
        let mut t = tracker(1, 1);
        t.record(0, 0);
        assert_eq!(t.entries().count(), 0);
    }

    #[test]
    fn admitted_counts_never_exceed_quota_in_any_window() {
        // Greedy admission every 700ms against N=7 per 3s.
        let window = 3 * SEC;
        let mut t = tracker(7, 3);
        let mut log: Vec<(u64, u64)> = Vec::new();
        let mut now = 0;
        for _ in 0..200 {
            let grant = t.remaining_capacity(now).min(4);
            t.record(now, grant);
            if grant > 0 {
                log.push((now, grant));
            }
            now += 700_000_000;
        }
        for &(end, _) in &log {
            let start = end.saturating_sub(window);
            let sum: u64 = log
                .iter()
                .filter(|(at, _)| *at > start && *at <= end)
                .map(|(_, c)| *c)
                .sum();
            assert!(sum <= 7, "window ending at {end} admitted {sum}");
        }
    }
}
