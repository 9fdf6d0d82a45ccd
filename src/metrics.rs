//! `Metrics` (spec §4.5, §6): a sampled JSON event log describing a run's
//! progress, complementary to `ProgressTracker`'s live counters. Grounded
//! on `database/mod.rs`'s `DatabaseStats`/`QueryProfile` plain-data stats
//! structs, serialized the way `manifest.json` is (`serde_json`), and
//! emitted through `tracing` the way `milli`/`risingwave` instrument their
//! batch loops (the teacher itself only uses `println!`; this crate's
//! ambient logging is an enrichment noted in DESIGN.md).

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// One emitted metrics event (spec §6's "batch_complete" / "indexing_metrics"
/// event kinds).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum MetricsEvent {
    #[serde(rename = "batch_complete")]
    BatchComplete { partition_id: u32, batch_index: u64, rows_processed: u64, rows_skipped: u64 },
    #[serde(rename = "indexing_metrics")]
    IndexingMetrics {
        documents_processed: u64,
        keys_written: u64,
        runs_written: u64,
        merge_steps_completed: u64,
        elapsed_ms: u64,
    },
}

/// Emits `MetricsEvent`s as structured `tracing` records, sampled so a huge
/// corpus doesn't produce one log line per batch. A `sample_every` of 1
/// disables sampling.
pub struct Metrics {
    sample_every: u64,
    batch_seq: AtomicU64,
}

impl Metrics {
    pub fn new(sample_every: u64) -> Self {
        Metrics { sample_every: sample_every.max(1), batch_seq: AtomicU64::new(0) }
    }

    /// Reports a completed batch within a partition. Emitted every
    /// `sample_every`-th call to keep log volume bounded on large corpora.
    pub fn record_batch_complete(
        &self,
        partition_id: u32,
        batch_index: u64,
        rows_processed: u64,
        rows_skipped: u64,
    ) {
        let seq = self.batch_seq.fetch_add(1, Ordering::Relaxed);
        if seq % self.sample_every != 0 {
            return;
        }
        let event =
            MetricsEvent::BatchComplete { partition_id, batch_index, rows_processed, rows_skipped };
        emit(&event);
    }

    /// Reports run-level aggregate metrics (spec §6); always emitted, since
    /// this fires once per run rather than once per batch.
    pub fn record_indexing_metrics(
        &self,
        documents_processed: u64,
        keys_written: u64,
        runs_written: u64,
        merge_steps_completed: u64,
        elapsed_ms: u64,
    ) {
        let event = MetricsEvent::IndexingMetrics {
            documents_processed,
            keys_written,
            runs_written,
            merge_steps_completed,
            elapsed_ms,
        };
        emit(&event);
    }
}

fn emit(event: &MetricsEvent) {
    match serde_json::to_string(event) {
        Ok(json) => tracing::info!(target: "chronodex::metrics", "{json}"),
        Err(e) => tracing::warn!(target: "chronodex::metrics", "failed to serialize metrics event: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_every_one_never_skips() {
        let metrics = Metrics::new(1);
        for i in 0..5 {
            metrics.record_batch_complete(0, i, 100, 0);
        }
        assert_eq!(metrics.batch_seq.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn sampling_does_not_panic_on_large_runs() {
        let metrics = Metrics::new(10);
        for i in 0..100 {
            metrics.record_batch_complete(0, i, 50, 1);
        }
        metrics.record_indexing_metrics(5_000, 12_345, 8, 3, 42_000);
    }

    #[test]
    fn serializes_with_event_tag() {
        let event = MetricsEvent::BatchComplete {
            partition_id: 1,
            batch_index: 2,
            rows_processed: 100,
            rows_skipped: 3,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"batch_complete\""));
    }
}
