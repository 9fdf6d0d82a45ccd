//! `ProgressTracker` (spec §4.5, §6): lock-free atomic counters callers can
//! poll from another thread while `generate_index()` runs. Grounded on the
//! teacher's `index/vamana/diskann_index.rs` partition-build loop, which
//! reports progress through a shared `AtomicUsize` updated from worker
//! threads via `rayon`'s `par_iter().try_for_each`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a run's progress at one instant. Cheap to construct; safe to
/// poll from any thread without blocking the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub documents_fetched: u64,
    pub documents_processed: u64,
    pub rows_skipped: u64,
    pub partitions_completed: u64,
    pub partitions_total: u64,
    pub runs_written: u64,
    pub merge_steps_completed: u64,
    pub keys_written: u64,
}

#[derive(Default)]
pub struct ProgressTracker {
    documents_fetched: AtomicU64,
    documents_processed: AtomicU64,
    rows_skipped: AtomicU64,
    partitions_completed: AtomicU64,
    partitions_total: AtomicU64,
    runs_written: AtomicU64,
    merge_steps_completed: AtomicU64,
    keys_written: AtomicU64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        ProgressTracker::default()
    }

    pub fn set_partitions_total(&self, total: u64) {
        self.partitions_total.store(total, Ordering::Relaxed);
    }

    pub fn add_documents_fetched(&self, n: u64) {
        self.documents_fetched.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_documents_processed(&self, n: u64) {
        self.documents_processed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_rows_skipped(&self, n: u64) {
        self.rows_skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_partitions_completed(&self) {
        self.partitions_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_runs_written(&self) {
        self.runs_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_merge_steps_completed(&self) {
        self.merge_steps_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_keys_written(&self, n: u64) {
        self.keys_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            documents_fetched: self.documents_fetched.load(Ordering::Relaxed),
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            partitions_completed: self.partitions_completed.load(Ordering::Relaxed),
            partitions_total: self.partitions_total.load(Ordering::Relaxed),
            runs_written: self.runs_written.load(Ordering::Relaxed),
            merge_steps_completed: self.merge_steps_completed.load(Ordering::Relaxed),
            keys_written: self.keys_written.load(Ordering::Relaxed),
        }
    }
}
