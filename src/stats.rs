//! Shared mining statistics
//!
//! One mutex guards every field, so a snapshot never mixes values from two
//! different updates. The miner writes, the reporter reads.

use crate::utils::compute_hash_rate;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Number of closest attempts remembered
pub const CLOSEST_ATTEMPTS_CAPACITY: usize = 10;

#[derive(Debug)]
struct StatsInner {
    hashes_tried: u64,
    blocks_found: u64,
    start_time: Instant,
    last_update: Option<Instant>,
    best_hash: Option<u32>,
    closest_attempts: VecDeque<u32>,
}

/// Thread-safe statistics for one mining session
#[derive(Debug)]
pub struct MiningStats {
    inner: Mutex<StatsInner>,
}

/// Point-in-time copy of [`MiningStats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub hashes_tried: u64,
    pub blocks_found: u64,
    pub elapsed: Duration,
    /// Hashes per second since the session started
    pub hash_rate: f64,
    pub best_hash: Option<u32>,
    /// Oldest first
    pub closest_attempts: Vec<u32>,
}

impl MiningStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatsInner {
                hashes_tried: 0,
                blocks_found: 0,
                start_time: Instant::now(),
                last_update: None,
                best_hash: None,
                closest_attempts: VecDeque::with_capacity(CLOSEST_ATTEMPTS_CAPACITY + 1),
            }),
        }
    }

    /// Restart the session clock. Counters are kept.
    pub fn mark_started(&self) {
        self.inner.lock().start_time = Instant::now();
    }

    pub fn increment_hashes(&self, count: u64) {
        let mut inner = self.inner.lock();
        inner.hashes_tried = inner.hashes_tried.saturating_add(count);
        inner.last_update = Some(Instant::now());
    }

    pub fn hashes(&self) -> u64 {
        self.inner.lock().hashes_tried
    }

    pub fn increment_blocks(&self) {
        self.inner.lock().blocks_found += 1;
    }

    pub fn blocks(&self) -> u64 {
        self.inner.lock().blocks_found
    }

    /// Record a candidate if it beats the current best.
    ///
    /// Returns true when the candidate became the new best.
    pub fn update_best_hash(&self, candidate: u32) -> bool {
        let mut inner = self.inner.lock();
        let improved = inner.best_hash.map_or(true, |best| candidate < best);
        if improved {
            inner.best_hash = Some(candidate);
            inner.closest_attempts.push_back(candidate);
            if inner.closest_attempts.len() > CLOSEST_ATTEMPTS_CAPACITY {
                inner.closest_attempts.pop_front();
            }
        }
        improved
    }

    pub fn best_hash(&self) -> Option<u32> {
        self.inner.lock().best_hash
    }

    /// Time since the last hash count update, if any happened
    pub fn since_last_update(&self) -> Option<Duration> {
        self.inner.lock().last_update.map(|at| at.elapsed())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.inner.lock().start_time.elapsed();
        self.snapshot_with_elapsed(elapsed)
    }

    fn snapshot_with_elapsed(&self, elapsed: Duration) -> StatsSnapshot {
        let inner = self.inner.lock();

        StatsSnapshot {
            hashes_tried: inner.hashes_tried,
            blocks_found: inner.blocks_found,
            elapsed,
            hash_rate: compute_hash_rate(inner.hashes_tried, elapsed),
            best_hash: inner.best_hash,
            closest_attempts: inner.closest_attempts.iter().copied().collect(),
        }
    }
}

impl Default for MiningStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_stats_are_empty() {
        let stats = MiningStats::new();
        let snapshot = stats.snapshot();

        assert_eq!(snapshot.hashes_tried, 0);
        assert_eq!(snapshot.blocks_found, 0);
        assert_eq!(snapshot.best_hash, None);
        assert!(snapshot.closest_attempts.is_empty());
        assert!(stats.since_last_update().is_none());
    }

    #[test]
    fn test_hash_rate_is_zero_within_first_millisecond() {
        let stats = MiningStats::new();
        stats.increment_hashes(1_000_000);

        let snapshot = stats.snapshot_with_elapsed(Duration::from_micros(500));
        assert_eq!(snapshot.hash_rate, 0.0);
        assert_eq!(snapshot.hashes_tried, 1_000_000);

        let snapshot = stats.snapshot_with_elapsed(Duration::ZERO);
        assert_eq!(snapshot.hash_rate, 0.0);
    }

    #[test]
    fn test_hash_rate_is_finite_right_after_start() {
        let stats = MiningStats::new();
        stats.increment_hashes(1_000_000);
        let snapshot = stats.snapshot();
        assert!(snapshot.hash_rate.is_finite());
        assert!(snapshot.hash_rate >= 0.0);
    }

    #[test]
    fn test_hash_rate_after_elapsed_time() {
        let stats = MiningStats::new();
        stats.increment_hashes(1000);
        thread::sleep(Duration::from_millis(20));

        let snapshot = stats.snapshot();
        assert!(snapshot.hash_rate > 0.0);
        assert!(snapshot.hash_rate <= 1000.0 / 0.02);
    }

    #[test]
    fn test_increment_updates_last_update() {
        let stats = MiningStats::new();
        stats.increment_hashes(5);
        assert!(stats.since_last_update().is_some());
        assert_eq!(stats.hashes(), 5);
    }

    #[test]
    fn test_blocks_counter() {
        let stats = MiningStats::new();
        stats.increment_blocks();
        stats.increment_blocks();
        assert_eq!(stats.blocks(), 2);
        assert_eq!(stats.snapshot().blocks_found, 2);
    }

    #[test]
    fn test_best_hash_only_improves() {
        let stats = MiningStats::new();

        assert!(stats.update_best_hash(500));
        assert!(!stats.update_best_hash(600));
        assert!(!stats.update_best_hash(500));
        assert!(stats.update_best_hash(100));

        assert_eq!(stats.best_hash(), Some(100));
        assert_eq!(stats.snapshot().closest_attempts, vec![500, 100]);
    }

    #[test]
    fn test_zero_is_a_valid_best_hash() {
        let stats = MiningStats::new();
        stats.update_best_hash(0);
        assert!(!stats.update_best_hash(1));
        assert_eq!(stats.best_hash(), Some(0));
    }

    #[test]
    fn test_closest_attempts_evict_oldest() {
        let stats = MiningStats::new();
        for candidate in (0..15u32).rev() {
            stats.update_best_hash(candidate * 10);
        }

        let attempts = stats.snapshot().closest_attempts;
        assert_eq!(attempts.len(), CLOSEST_ATTEMPTS_CAPACITY);
        assert_eq!(attempts.first(), Some(&90));
        assert_eq!(attempts.last(), Some(&0));
    }

    #[test]
    fn test_concurrent_increments_lose_nothing() {
        let stats = Arc::new(MiningStats::new());
        let threads = 8;
        let calls = 10_000;
        let k = 7u64;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..calls {
                        stats.increment_hashes(k);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.hashes(), threads * calls * k);
    }

    #[test]
    fn test_concurrent_best_hash_keeps_minimum() {
        let stats = Arc::new(MiningStats::new());

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for i in 0..1000u32 {
                        stats.update_best_hash(1_000_000 - i * 4 - t);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.best_hash(), Some(1_000_000 - 999 * 4 - 3));
        assert!(stats.snapshot().closest_attempts.len() <= CLOSEST_ATTEMPTS_CAPACITY);
    }

    proptest! {
        #[test]
        fn best_hash_tracks_minimum(candidates in prop::collection::vec(any::<u32>(), 1..200)) {
            let stats = MiningStats::new();
            let mut previous: Option<u32> = None;

            for &candidate in &candidates {
                stats.update_best_hash(candidate);
                let best = stats.best_hash();
                if let (Some(prev), Some(now)) = (previous, best) {
                    prop_assert!(now <= prev);
                }
                previous = best;
            }

            prop_assert_eq!(stats.best_hash(), candidates.iter().copied().min());

            let attempts = stats.snapshot().closest_attempts;
            prop_assert!(attempts.len() <= CLOSEST_ATTEMPTS_CAPACITY);
            prop_assert!(attempts.windows(2).all(|w| w[1] < w[0]));
        }
    }
}
