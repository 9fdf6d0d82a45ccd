//! Configuration surface (spec §6), in the teacher's `config.rs` shape:
//! a `Default`-derived struct plus named preset constructors, serde-backed
//! so it can be loaded from a file without pulling in a CLI parser.

use crate::error::{IndexError, Result};
use crate::index_types::IndexType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Which index types a run should build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexTypeSet {
    All,
    Only(HashSet<IndexType>),
}

impl IndexTypeSet {
    pub fn contains(&self, ty: IndexType) -> bool {
        match self {
            IndexTypeSet::All => true,
            IndexTypeSet::Only(set) => set.contains(&ty),
        }
    }

    pub fn resolve(&self) -> Vec<IndexType> {
        match self {
            IndexTypeSet::All => IndexType::ALL.to_vec(),
            IndexTypeSet::Only(set) => {
                let mut v: Vec<IndexType> = set.iter().copied().collect();
                v.sort_by_key(|t| t.as_str());
                v
            }
        }
    }
}

/// Full configuration surface for an index-generation run (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub index_dir: PathBuf,
    pub batch_size: u32,
    pub worker_count: u32,
    pub merge_fan_in: u32,
    pub memory_threshold: f64,
    /// Budget the `MemoryGovernor` samples against (spec §4.4); the teacher's
    /// equivalent knob is `memtable_size_limit`.
    pub memory_budget_bytes: u64,
    pub stopwords_path: Option<PathBuf>,
    pub preserve_existing_index: bool,
    pub size_threshold_for_delete_confirmation: u64,
    pub index_types: IndexTypeSet,
    /// Relation prefixes that trigger the HYPERNYM variant (spec §4.7
    /// names `nmod:such_as`/`nmod:including`; kept configurable per
    /// SPEC_FULL.md's supplement).
    pub hypernym_relation_prefixes: Vec<String>,
    /// Relations the DEPENDENCY variant always filters out (spec §4.7).
    pub dependency_relation_blacklist: HashSet<String>,
    /// Optional overall deadline for a single `generate_index()` call
    /// (spec §5/§9); `None` means no deadline.
    pub overall_deadline: Option<std::time::Duration>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        IndexerConfig {
            index_dir: PathBuf::from("./index"),
            batch_size: 1_000,
            worker_count: default_worker_count(),
            merge_fan_in: 64,
            memory_threshold: 0.75,
            memory_budget_bytes: 512 * 1024 * 1024,
            stopwords_path: None,
            preserve_existing_index: false,
            size_threshold_for_delete_confirmation: 10 * 1024 * 1024 * 1024,
            index_types: IndexTypeSet::All,
            hypernym_relation_prefixes: vec!["nmod:such_as".to_string(), "nmod:including".to_string()],
            dependency_relation_blacklist: [
                "det", "cc", "case", "punct", "mark", "aux", "cop",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            overall_deadline: None,
        }
    }
}

fn default_worker_count() -> u32 {
    std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(4).min(8)
}

impl IndexerConfig {
    /// A config tuned for one-shot bulk imports over a large corpus:
    /// larger batches, full worker fan-out, wider merge fan-in.
    pub fn for_bulk_import(index_dir: impl Into<PathBuf>) -> Self {
        IndexerConfig {
            index_dir: index_dir.into(),
            batch_size: 10_000,
            worker_count: default_worker_count(),
            merge_fan_in: 64,
            ..Default::default()
        }
    }

    /// A config tuned for deterministic, fast tests: small batches, a
    /// single worker (removes cross-partition scheduling nondeterminism
    /// from test assertions that care about exact ordering), tight fan-in.
    pub fn for_testing(index_dir: impl Into<PathBuf>) -> Self {
        IndexerConfig {
            index_dir: index_dir.into(),
            batch_size: 64,
            worker_count: 1,
            merge_fan_in: 4,
            ..Default::default()
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        serde_json::from_slice(&bytes).map_err(|e| IndexError::Config(e.to_string()))
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|e| IndexError::Config(e.to_string()))?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Validates the surface-level invariants spec §6/§7 expect callers to
    /// have checked before `generate_index()` is invoked.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(IndexError::Config("worker_count must be >= 1".into()));
        }
        if self.batch_size == 0 {
            return Err(IndexError::Config("batch_size must be >= 1".into()));
        }
        if self.merge_fan_in < 2 {
            return Err(IndexError::Config("merge_fan_in must be >= 2".into()));
        }
        if !(0.0..1.0).contains(&self.memory_threshold) {
            return Err(IndexError::Config("memory_threshold must be in [0, 1)".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_validates() {
        assert!(IndexerConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers() {
        let mut cfg = IndexerConfig::default();
        cfg.worker_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn round_trips_through_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let cfg = IndexerConfig::for_bulk_import(dir.path().join("idx"));
        cfg.to_file(&path).unwrap();
        let loaded = IndexerConfig::from_file(&path).unwrap();
        assert_eq!(loaded.batch_size, cfg.batch_size);
        assert_eq!(loaded.index_dir, cfg.index_dir);
    }

    #[test]
    fn index_type_set_all_contains_everything() {
        let set = IndexTypeSet::All;
        assert!(set.contains(IndexType::Unigram));
        assert!(set.contains(IndexType::Stitch));
    }

    #[test]
    fn index_type_set_only_filters() {
        let mut only = HashSet::new();
        only.insert(IndexType::Unigram);
        let set = IndexTypeSet::Only(only);
        assert!(set.contains(IndexType::Unigram));
        assert!(!set.contains(IndexType::Bigram));
    }
}
