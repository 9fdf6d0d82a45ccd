//! `IndexGenerator` (spec §4.6): batched fetch -> document-atomic partition
//! -> parallel `process_partition` -> per-partition RunFile spill -> external
//! merge -> KVStore write, one instance per index type.
//!
//! Grounded on the teacher's `index/vamana/diskann_index.rs` build loop
//! (`rayon`-parallel partition dispatch reporting into a shared progress
//! counter) for the fetch/process loop shape, and on
//! `storage/lsm/engine.rs`'s bulk-load path (build into a scratch directory,
//! only rename into place on success) for `generate_index()`'s atomicity.

use crate::config::IndexerConfig;
use crate::error::{IndexError, Result, SkipReasonCounts};
use crate::index_types::{IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::kvstore::KVStoreBuilder;
use crate::memory_governor::MemoryGovernor;
use crate::merger::{merge_position_postings, merge_stitch_postings, ExternalMerger};
use crate::metrics::Metrics;
use crate::partition::partition_entries;
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::runfile::{RunFileReader, RunFileWriter};
use crate::stopwords::StopwordSet;
use crate::store::{AnnotationStore, Row, RowKind};
use crate::synonym::SynonymTable;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Records read from the run file between cancellation/deadline checks
/// during the final merge-and-write pass (spec §5's "every N records").
const CANCEL_CHECK_INTERVAL: u64 = 4_096;

/// `CREATED → FETCHING ↔ PROCESSING → FLUSHING → MERGING → WRITING → DONE`,
/// with `FAILED` reachable from any state (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Created,
    Fetching,
    Processing,
    Flushing,
    Merging,
    Writing,
    Done,
    Failed,
}

impl GeneratorState {
    fn to_u8(self) -> u8 {
        match self {
            GeneratorState::Created => 0,
            GeneratorState::Fetching => 1,
            GeneratorState::Processing => 2,
            GeneratorState::Flushing => 3,
            GeneratorState::Merging => 4,
            GeneratorState::Writing => 5,
            GeneratorState::Done => 6,
            GeneratorState::Failed => 7,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => GeneratorState::Fetching,
            2 => GeneratorState::Processing,
            3 => GeneratorState::Flushing,
            4 => GeneratorState::Merging,
            5 => GeneratorState::Writing,
            6 => GeneratorState::Done,
            7 => GeneratorState::Failed,
            _ => GeneratorState::Created,
        }
    }
}

/// The `manifest.json` schema (spec §6): `{ type, created_at_unix,
/// record_count, checksum }`.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    #[serde(rename = "type")]
    index_type: String,
    created_at_unix: u64,
    record_count: u64,
    checksum: u32,
}

/// Outcome of a completed `generate_index()` call.
#[derive(Debug, Clone)]
pub struct GenerateReport {
    pub index_type: IndexType,
    pub record_count: u64,
    pub checksum: u32,
    pub elapsed: Duration,
    pub progress: ProgressSnapshot,
    pub skip_counts: SkipReasonCounts,
}

/// Builds one index type's on-disk `KVStore` from an `AnnotationStore`
/// (spec §4.6's public contract).
pub struct IndexGenerator<'a> {
    config: &'a IndexerConfig,
    store: &'a dyn AnnotationStore,
    spec: &'a dyn IndexSpec,
    stopwords: &'a StopwordSet,
    governor: MemoryGovernor,
    progress: ProgressTracker,
    metrics: Metrics,
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
    state: AtomicU8,
}

impl<'a> IndexGenerator<'a> {
    pub fn new(
        config: &'a IndexerConfig,
        store: &'a dyn AnnotationStore,
        spec: &'a dyn IndexSpec,
        stopwords: &'a StopwordSet,
        cancel: Arc<AtomicBool>,
    ) -> Result<Self> {
        config.validate()?;
        let deadline = config.overall_deadline.map(|d| Instant::now() + d);
        Ok(IndexGenerator {
            config,
            store,
            spec,
            stopwords,
            governor: MemoryGovernor::new(config.memory_budget_bytes, config.memory_threshold),
            progress: ProgressTracker::new(),
            metrics: Metrics::new(10),
            cancel,
            deadline,
            state: AtomicU8::new(GeneratorState::Created.to_u8()),
        })
    }

    pub fn state(&self) -> GeneratorState {
        GeneratorState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    fn set_state(&self, state: GeneratorState) {
        self.state.store(state.to_u8(), Ordering::Relaxed);
    }

    /// Checked at every poll point spec §5 names: batch boundary, partition
    /// start, every `CANCEL_CHECK_INTERVAL` merge records.
    fn poll(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(IndexError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.cancel.store(true, Ordering::Relaxed);
                return Err(IndexError::Timeout);
            }
        }
        Ok(())
    }

    /// Runs the full build, writing into `<index_dir>/<type>/`. The
    /// directory is only ever touched by an atomic rename at the very end
    /// (success) or left untouched entirely (failure/cancellation) — see
    /// the module doc.
    pub fn generate_index(&self) -> Result<GenerateReport> {
        let start = Instant::now();
        let type_name = self.spec.index_type().as_str();
        let final_dir = self.config.index_dir.join(type_name);
        let building_dir = self.config.index_dir.join(format!("{type_name}.building"));

        if building_dir.exists() {
            std::fs::remove_dir_all(&building_dir)?;
        }
        if final_dir.exists() {
            if self.config.preserve_existing_index {
                return Err(IndexError::Config(format!(
                    "index directory {final_dir:?} already exists and preserve_existing_index is set"
                )));
            }
            let size = directory_size(&final_dir).unwrap_or(0);
            if size > self.config.size_threshold_for_delete_confirmation {
                tracing::warn!(
                    target: "chronodex::generator",
                    ?final_dir,
                    size,
                    "deleting existing index directory above size_threshold_for_delete_confirmation \
                     without interactive confirmation (no CLI frontend is in scope for this library)",
                );
            }
        }

        let runs_dir = building_dir.join("runs");
        let kv_dir = building_dir.join("kv");
        std::fs::create_dir_all(&runs_dir)?;
        std::fs::create_dir_all(&kv_dir)?;

        match self.run_build(&building_dir, &runs_dir, &kv_dir, start) {
            Ok(report) => {
                if final_dir.exists() {
                    std::fs::remove_dir_all(&final_dir)?;
                }
                std::fs::rename(&building_dir, &final_dir)?;
                self.set_state(GeneratorState::Done);
                Ok(report)
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&building_dir);
                self.set_state(GeneratorState::Failed);
                Err(e)
            }
        }
    }

    fn run_build(
        &self,
        building_dir: &Path,
        runs_dir: &Path,
        kv_dir: &Path,
        start: Instant,
    ) -> Result<GenerateReport> {
        let synonyms = if self.spec.uses_synonyms() {
            Some(SynonymTable::open(building_dir.join("synonyms"))?)
        } else {
            None
        };

        let row_kind = self.spec.row_kind();
        let mut offset = 0u64;
        let mut run_paths: Vec<PathBuf> = Vec::new();
        let mut next_run_id = 0u32;
        let mut batch_index = 0u64;
        let mut skip_counts = SkipReasonCounts::new();

        loop {
            self.set_state(GeneratorState::Fetching);
            self.poll()?;

            let limit = self.governor.recommended_batch_size();
            let entries = self.fetch_with_retry(row_kind, offset, limit)?;
            if entries.is_empty() {
                break;
            }
            let fetched = entries.len() as u64;
            offset += fetched;

            self.set_state(GeneratorState::Processing);
            let partitions = partition_entries(entries, self.config.worker_count as usize);
            self.progress.set_partitions_total(partitions.len() as u64);

            let ctx = ProcessContext {
                stopwords: self.stopwords,
                synonyms: synonyms.as_ref(),
                dependency_relation_blacklist: &self.config.dependency_relation_blacklist,
                hypernym_relation_prefixes: &self.config.hypernym_relation_prefixes,
            };
            let cancel = Arc::clone(&self.cancel);

            let results: Vec<(u64, Result<(PostingsOutput, SkipReasonCounts)>)> = partitions
                .into_par_iter()
                .map(|partition_rows| {
                    if cancel.load(Ordering::Relaxed) {
                        return (0, Err(IndexError::Cancelled));
                    }
                    let doc_count = partition_rows.iter().map(Row::document_id).collect::<HashSet<_>>().len() as u64;
                    let output = self.spec.process_partition(&partition_rows, &ctx);
                    (doc_count, output)
                })
                .collect();

            self.set_state(GeneratorState::Flushing);
            for (doc_count, output) in results {
                self.poll()?;
                let (output, partition_skipped) = output?;
                self.progress.add_documents_processed(doc_count);
                self.progress.add_rows_skipped(partition_skipped.total());
                skip_counts.merge(&partition_skipped);

                let run_path = runs_dir.join(format!("run-{next_run_id:08}.tmp"));
                next_run_id += 1;
                let (keys_written, estimated_bytes) = flush_partition_to_run(&output, &run_path)?;
                self.progress.add_keys_written(keys_written);
                self.progress.inc_runs_written();
                self.progress.inc_partitions_completed();
                self.governor.record_sample(estimated_bytes);
                run_paths.push(run_path);
            }

            self.metrics.record_batch_complete(0, batch_index, fetched, 0);
            batch_index += 1;
        }

        self.poll()?;
        self.set_state(GeneratorState::Merging);
        let merge_fn = merge_fn_for(self.spec.index_type());
        let merger = ExternalMerger::new(self.config.merge_fan_in as usize, runs_dir);
        let merged_path = building_dir.join("merged.tmp");
        if run_paths.is_empty() {
            RunFileWriter::create(&merged_path)?.finish()?;
        } else {
            merger.merge_all(run_paths, &merged_path, merge_fn)?;
        }
        self.progress.inc_merge_steps_completed();

        self.set_state(GeneratorState::Writing);
        let mut kv_builder = KVStoreBuilder::new(kv_dir)?;
        let mut record_count = 0u64;
        let mut hasher = crc32fast::Hasher::new();
        for (i, entry) in RunFileReader::open(&merged_path)?.enumerate() {
            if i as u64 % CANCEL_CHECK_INTERVAL == 0 {
                self.poll()?;
            }
            let (key, value) = entry?;
            hasher.update(&key);
            hasher.update(&value);
            kv_builder.put(&key, &value)?;
            record_count += 1;
        }
        kv_builder.finish()?;
        let checksum = hasher.finalize();

        if let Some(synonyms) = &synonyms {
            synonyms.flush()?;
        }

        let manifest = ManifestFile {
            index_type: self.spec.index_type().as_str().to_string(),
            created_at_unix: SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs(),
            record_count,
            checksum,
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest).map_err(|e| IndexError::Serialization(e.to_string()))?;
        std::fs::write(building_dir.join("manifest.json"), manifest_bytes)?;

        let elapsed = start.elapsed();
        let progress = self.progress.snapshot();
        self.metrics.record_indexing_metrics(
            progress.documents_processed,
            progress.keys_written,
            progress.runs_written,
            progress.merge_steps_completed,
            elapsed.as_millis() as u64,
        );

        Ok(GenerateReport { index_type: self.spec.index_type(), record_count, checksum, elapsed, progress, skip_counts })
    }

    /// Retries a batch fetch up to 3 times before surfacing `StoreRead`
    /// (spec §7's `StoreReadError` policy).
    fn fetch_with_retry(&self, kind: RowKind, offset: u64, limit: u32) -> Result<Vec<Row>> {
        let mut last_err = None;
        for _ in 0..3 {
            match self.store.fetch_batch(kind, offset, limit) {
                Ok(rows) => return Ok(rows),
                Err(e) => last_err = Some(e),
            }
        }
        Err(IndexError::StoreRead { attempts: 3, source: Box::new(last_err.expect("loop runs at least once")) })
    }
}

fn merge_fn_for(index_type: IndexType) -> fn(&[u8], &[u8]) -> Result<Vec<u8>> {
    match index_type {
        IndexType::Stitch => merge_stitch_postings,
        _ => merge_position_postings,
    }
}

/// Writes one partition's postings to a fresh sorted RunFile, returning the
/// number of distinct keys written and a rough byte-size estimate fed to the
/// `MemoryGovernor` (spec §4.4) as a proxy for true process memory pressure
/// — this crate carries no OS memory-sampling dependency, so the estimate is
/// derived from the in-memory posting data itself.
fn flush_partition_to_run(output: &PostingsOutput, path: &Path) -> Result<(u64, u64)> {
    let mut writer = RunFileWriter::create(path)?;
    let mut count = 0u64;
    let mut estimated_bytes = 0u64;

    match output {
        PostingsOutput::Position(map) => {
            let mut keys: Vec<&Vec<u8>> = map.keys().collect();
            keys.sort();
            for key in keys {
                let list = &map[key];
                let value = list.serialize();
                estimated_bytes += (key.len() + value.len()) as u64;
                writer.write(key, &value)?;
                count += 1;
            }
        }
        PostingsOutput::Stitch(map) => {
            let mut keys: Vec<&Vec<u8>> = map.keys().collect();
            keys.sort();
            for key in keys {
                let list = &map[key];
                let value = list.serialize();
                estimated_bytes += (key.len() + value.len()) as u64;
                writer.write(key, &value)?;
                count += 1;
            }
        }
    }

    writer.finish()?;
    Ok((count, estimated_bytes))
}

fn directory_size(path: &Path) -> Result<u64> {
    let mut total = 0u64;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() { directory_size(&entry.path())? } else { meta.len() };
    }
    Ok(total)
}
