//! Index variants (spec §4.7): nine `IndexSpec` implementations, each a
//! filter + key-derivation rule over either `annotations` or
//! `dependencies` rows.
//!
//! Grounded on the teacher's `index/text_fts.rs` tokenize -> term-id ->
//! per-term posting accumulation loop, and on `index/builder.rs`'s
//! `IndexBuilder` trait (`build_from_memtable`/`persist`/`stats`), whose
//! capability-record shape `IndexSpec` generalizes into a fetch/filter/
//! derive-keys record, per the design note on re-expressing inherited
//! generators as one driver plus a capability record.

mod bigram;
mod dependency;
mod hypernym;
mod ner;
mod ner_date;
mod pos;
mod stitch;
mod trigram;
mod unigram;

pub use bigram::BigramIndexSpec;
pub use dependency::DependencyIndexSpec;
pub use hypernym::HypernymIndexSpec;
pub use ner::NerIndexSpec;
pub use ner_date::NerDateIndexSpec;
pub use pos::PosIndexSpec;
pub use stitch::StitchIndexSpec;
pub use trigram::TrigramIndexSpec;
pub use unigram::UnigramIndexSpec;

use crate::error::{Result, SkipReasonCounts};
use crate::posting::PostingList;
use crate::position::{Position, StitchPosition};
use crate::stopwords::StopwordSet;
use crate::store::{Row, RowKind};
use crate::synonym::SynonymTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IndexType {
    Unigram,
    Bigram,
    Trigram,
    Pos,
    Ner,
    NerDate,
    Dependency,
    Hypernym,
    Stitch,
}

impl IndexType {
    pub const ALL: [IndexType; 9] = [
        IndexType::Unigram,
        IndexType::Bigram,
        IndexType::Trigram,
        IndexType::Pos,
        IndexType::Ner,
        IndexType::NerDate,
        IndexType::Dependency,
        IndexType::Hypernym,
        IndexType::Stitch,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IndexType::Unigram => "unigram",
            IndexType::Bigram => "bigram",
            IndexType::Trigram => "trigram",
            IndexType::Pos => "pos",
            IndexType::Ner => "ner",
            IndexType::NerDate => "ner_date",
            IndexType::Dependency => "dependency",
            IndexType::Hypernym => "hypernym",
            IndexType::Stitch => "stitch",
        }
    }
}

/// The output of one partition's `process_partition`: most variants
/// accumulate plain `Position` postings, but STITCH carries the extra
/// `synonym_id`/`annotation_type` fields of `StitchPosition`.
pub enum PostingsOutput {
    Position(HashMap<Vec<u8>, PostingList<Position>>),
    Stitch(HashMap<Vec<u8>, PostingList<StitchPosition>>),
}

/// Shared inputs every variant's filter/key-derivation may need (spec
/// §4.6.2's "type-specific filter"/"type-specific rule").
pub struct ProcessContext<'a> {
    pub stopwords: &'a StopwordSet,
    pub synonyms: Option<&'a SynonymTable>,
    pub dependency_relation_blacklist: &'a std::collections::HashSet<String>,
    pub hypernym_relation_prefixes: &'a [String],
}

/// A capability record for one index variant (spec §9's design note):
/// which table it reads, its row filter, and its key-derivation rule.
pub trait IndexSpec: Send + Sync {
    fn index_type(&self) -> IndexType;
    fn row_kind(&self) -> RowKind;
    fn uses_synonyms(&self) -> bool;

    /// Filters, derives keys, and accumulates Positions for one partition
    /// (spec §4.6.2). Implementations sort each returned PostingList before
    /// returning, per step 5 of that contract, and tally every row they
    /// drop into the returned `SkipReasonCounts` rather than silently
    /// discarding the reason (spec §7's "count, continue" policy).
    fn process_partition(&self, rows: &[Row], ctx: &ProcessContext) -> Result<(PostingsOutput, SkipReasonCounts)>;
}

/// Unicode-aware case fold + trim, applied to every textual key component
/// (spec §4.7).
pub(crate) fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// NUL-byte join of key components (spec §3's `⊕`).
pub(crate) fn join_key(parts: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push(0);
        }
        out.extend_from_slice(part.as_bytes());
    }
    out
}

/// Builds the nine default `IndexSpec`s, keyed by `IndexType`.
pub fn default_specs() -> HashMap<IndexType, Box<dyn IndexSpec>> {
    let mut specs: HashMap<IndexType, Box<dyn IndexSpec>> = HashMap::new();
    specs.insert(IndexType::Unigram, Box::new(UnigramIndexSpec));
    specs.insert(IndexType::Bigram, Box::new(BigramIndexSpec));
    specs.insert(IndexType::Trigram, Box::new(TrigramIndexSpec));
    specs.insert(IndexType::Pos, Box::new(PosIndexSpec));
    specs.insert(IndexType::Ner, Box::new(NerIndexSpec));
    specs.insert(IndexType::NerDate, Box::new(NerDateIndexSpec));
    specs.insert(IndexType::Dependency, Box::new(DependencyIndexSpec));
    specs.insert(IndexType::Hypernym, Box::new(HypernymIndexSpec));
    specs.insert(IndexType::Stitch, Box::new(StitchIndexSpec));
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_specs_cover_every_index_type() {
        let specs = default_specs();
        for ty in IndexType::ALL {
            assert!(specs.contains_key(&ty), "missing spec for {:?}", ty);
            assert_eq!(specs[&ty].index_type(), ty);
        }
    }

    #[test]
    fn join_key_uses_nul_delimiter() {
        let key = join_key(&["the", "quick"]);
        assert_eq!(key, b"the\0quick");
    }

    #[test]
    fn normalize_lowercases_and_trims() {
        assert_eq!(normalize("  Cat  "), "cat");
    }
}
