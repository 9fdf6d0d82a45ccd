//! Error taxonomy for the index-generation engine (spec §7).

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors raised while generating one index. Row-level problems never reach
/// this type directly — they are accumulated into `SkipReasonCounts` and
/// only escalate to `IndexError` when spec §7 says they are fatal.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("annotation store read failed after {attempts} attempts: {source}")]
    StoreRead {
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("corrupt posting data in {path:?}: {reason}")]
    CorruptPosting { path: Option<PathBuf>, reason: String },

    #[error("spill I/O error writing {path:?}: {source}")]
    SpillIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("out of memory while flushing partition: {0}")]
    OutOfMemory(String),

    #[error("KVStore write failed: {0}")]
    StoreWrite(String),

    #[error("index generation cancelled")]
    Cancelled,

    #[error("index generation exceeded its deadline")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

impl IndexError {
    /// Process exit code per spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            IndexError::Config(_) => 2,
            IndexError::StoreRead { .. } => 3,
            IndexError::CorruptPosting { .. } => 4,
            IndexError::OutOfMemory(_) => 4,
            IndexError::SpillIo { .. } => 5,
            IndexError::StoreWrite(_) => 5,
            IndexError::Cancelled => 130,
            IndexError::Timeout => 130,
            IndexError::Io(_) => 5,
            IndexError::Serialization(_) => 4,
        }
    }
}

/// Reasons a single annotation/dependency row can be skipped (spec §7's
/// `RowSkipped`/`InvalidDate`, counted rather than propagated).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NullRequiredField,
    Stopword,
    BlacklistedRelation,
    InvalidDate,
    SentenceBoundary,
    NotDateNer,
}

/// Per-partition tally of skipped rows, merged into generator-wide totals
/// and surfaced through `Metrics`.
#[derive(Debug, Clone, Default)]
pub struct SkipReasonCounts {
    counts: std::collections::HashMap<SkipReason, u64>,
}

impl SkipReasonCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reason: SkipReason) {
        *self.counts.entry(reason).or_insert(0) += 1;
    }

    pub fn get(&self, reason: SkipReason) -> u64 {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn merge(&mut self, other: &SkipReasonCounts) {
        for (reason, count) in &other.counts {
            *self.counts.entry(*reason).or_insert(0) += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec_table() {
        assert_eq!(IndexError::Config("x".into()).exit_code(), 2);
        assert_eq!(
            IndexError::CorruptPosting { path: None, reason: "x".into() }.exit_code(),
            4
        );
        assert_eq!(IndexError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn skip_counts_accumulate_and_merge() {
        let mut a = SkipReasonCounts::new();
        a.record(SkipReason::Stopword);
        a.record(SkipReason::Stopword);
        let mut b = SkipReasonCounts::new();
        b.record(SkipReason::InvalidDate);
        a.merge(&b);
        assert_eq!(a.get(SkipReason::Stopword), 2);
        assert_eq!(a.get(SkipReason::InvalidDate), 1);
        assert_eq!(a.total(), 3);
    }
}
