//! `MemoryGovernor` (spec §4.4): an advisory controller that shrinks or
//! grows batch sizes in response to sampled process memory pressure, and
//! signals when an in-memory structure should be spilled to disk.
//!
//! No single teacher file owns this concept, but the shape — a sampled
//! ratio against a configured threshold driving a small discrete state
//! machine — mirrors `config.rs`'s `LSMConfig`/`DurabilityLevel` pattern of
//! numeric thresholds, and the periodic-sampling idea mirrors
//! `storage/lsm/engine.rs`'s background `flush_thread`/`compaction_thread`
//! pattern of a thread polling shared atomics. Built directly on
//! `std::sync::atomic`; no new dependency needed.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const MIN_BATCH_SIZE: u32 = 1_000;
const MAX_BATCH_SIZE: u32 = 100_000;
const GROW_STREAK_TARGET: u32 = 3;

/// Tracks sampled memory usage against a configured threshold and derives
/// an advisory batch size plus a spill decision from it (spec §4.4).
pub struct MemoryGovernor {
    max_bytes: u64,
    threshold: f64,
    used_bytes: AtomicU64,
    batch_size: AtomicU32,
    /// Consecutive low-pressure samples since the last halving; used to
    /// require `GROW_STREAK_TARGET` calm samples before doubling back up,
    /// so a single favorable reading can't undo a halving noise-induced.
    calm_streak: AtomicU32,
}

impl MemoryGovernor {
    pub fn new(max_bytes: u64, threshold: f64) -> Self {
        MemoryGovernor {
            max_bytes,
            threshold,
            used_bytes: AtomicU64::new(0),
            batch_size: AtomicU32::new(MAX_BATCH_SIZE),
            calm_streak: AtomicU32::new(0),
        }
    }

    /// Records a fresh heap-usage sample and updates the recommended batch
    /// size accordingly: halve on high pressure, double back up (capped at
    /// `MAX_BATCH_SIZE`) after `GROW_STREAK_TARGET` consecutive calm samples.
    pub fn record_sample(&self, used_bytes: u64) {
        self.used_bytes.store(used_bytes, Ordering::Relaxed);
        let ratio = self.ratio(used_bytes);

        if ratio > self.threshold {
            self.calm_streak.store(0, Ordering::Relaxed);
            let mut current = self.batch_size.load(Ordering::Relaxed);
            loop {
                let next = (current / 2).max(MIN_BATCH_SIZE);
                match self.batch_size.compare_exchange(
                    current,
                    next,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }
        } else if ratio < self.threshold / 2.0 {
            let streak = self.calm_streak.fetch_add(1, Ordering::Relaxed) + 1;
            if streak >= GROW_STREAK_TARGET {
                self.calm_streak.store(0, Ordering::Relaxed);
                let mut current = self.batch_size.load(Ordering::Relaxed);
                loop {
                    let next = (current.saturating_mul(2)).min(MAX_BATCH_SIZE);
                    match self.batch_size.compare_exchange(
                        current,
                        next,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(observed) => current = observed,
                    }
                }
            }
        } else {
            self.calm_streak.store(0, Ordering::Relaxed);
        }
    }

    fn ratio(&self, used_bytes: u64) -> f64 {
        if self.max_bytes == 0 {
            return 1.0;
        }
        used_bytes as f64 / self.max_bytes as f64
    }

    /// Advisory batch size for the next unit of work, always within
    /// `[MIN_BATCH_SIZE, MAX_BATCH_SIZE]`.
    pub fn recommended_batch_size(&self) -> u32 {
        self.batch_size.load(Ordering::Relaxed)
    }

    /// Whether the last sample exceeded the configured threshold, meaning
    /// in-memory accumulators should be spilled to a run file now rather
    /// than continuing to grow.
    pub fn should_spill(&self) -> bool {
        self.ratio(self.used_bytes.load(Ordering::Relaxed)) > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_max_batch_size() {
        let gov = MemoryGovernor::new(1_000_000, 0.75);
        assert_eq!(gov.recommended_batch_size(), MAX_BATCH_SIZE);
        assert!(!gov.should_spill());
    }

    #[test]
    fn high_pressure_halves_batch_size_and_requests_spill() {
        let gov = MemoryGovernor::new(1_000, 0.75);
        gov.record_sample(900);
        assert_eq!(gov.recommended_batch_size(), MAX_BATCH_SIZE / 2);
        assert!(gov.should_spill());
    }

    #[test]
    fn batch_size_never_drops_below_minimum() {
        let gov = MemoryGovernor::new(1_000, 0.75);
        for _ in 0..20 {
            gov.record_sample(999);
        }
        assert_eq!(gov.recommended_batch_size(), MIN_BATCH_SIZE);
    }

    #[test]
    fn requires_consecutive_calm_samples_before_growing_back() {
        let gov = MemoryGovernor::new(1_000, 0.75);
        gov.record_sample(900); // halve to MAX/2
        let shrunk = gov.recommended_batch_size();

        gov.record_sample(10); // calm sample 1
        assert_eq!(gov.recommended_batch_size(), shrunk, "one calm sample should not grow yet");
        gov.record_sample(10); // calm sample 2
        assert_eq!(gov.recommended_batch_size(), shrunk);
        gov.record_sample(10); // calm sample 3: grows
        assert_eq!(gov.recommended_batch_size(), (shrunk * 2).min(MAX_BATCH_SIZE));
    }

    #[test]
    fn batch_size_never_exceeds_maximum() {
        let gov = MemoryGovernor::new(1_000, 0.75);
        for _ in 0..20 {
            gov.record_sample(0);
        }
        assert_eq!(gov.recommended_batch_size(), MAX_BATCH_SIZE);
    }
}
