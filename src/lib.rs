//! chronodex: a parallel, memory-bounded, externally-merged index-generation
//! engine for temporal-aware linguistic annotation search.
//!
//! Reads `documents`/`annotations`/`dependencies` rows from a caller-supplied
//! [`store::AnnotationStore`], and for each selected [`index_types::IndexType`]
//! builds a sorted, on-disk [`kvstore::KVStore`] of posting lists through
//! [`generator::IndexGenerator`]: fetch in batches, partition documents across
//! workers, spill each partition's postings to a sorted run file, externally
//! merge the run files, and bulk-load the merged stream into the store.

pub mod config;
pub mod date;
pub mod error;
pub mod generator;
pub mod index_types;
pub mod kvstore;
pub mod memory_governor;
pub mod merger;
pub mod metrics;
pub mod partition;
pub mod position;
pub mod posting;
pub mod progress;
pub mod runfile;
pub mod stopwords;
pub mod store;
pub mod synonym;
pub mod varint;

pub use config::{IndexTypeSet, IndexerConfig};
pub use date::Epoch;
pub use error::{IndexError, Result, SkipReason, SkipReasonCounts};
pub use generator::{GenerateReport, GeneratorState, IndexGenerator};
pub use index_types::{default_specs, IndexSpec, IndexType, PostingsOutput, ProcessContext};
pub use kvstore::{KVStore, KVStoreBuilder};
pub use position::{AnnotationType, Position, StitchPosition};
pub use posting::PostingList;
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use stopwords::StopwordSet;
pub use store::{AnnotationRow, AnnotationStore, DependencyRow, Document, InMemoryAnnotationStore, Row, RowKind};
pub use synonym::{SynonymNamespace, SynonymTable};

/// Builds every index type `config.index_types` selects, one
/// [`IndexGenerator`] run at a time, sharing the same store/stopwords/cancel
/// flag (spec §2's orchestrator: "for each index type, construct an
/// `IndexGenerator` and run it to completion before moving to the next").
///
/// Stops at the first failing index type rather than attempting the rest,
/// since a caller that asked for N index types almost always wants to know
/// about a failure immediately rather than get a partial set silently.
pub fn generate_all_indexes(
    config: &IndexerConfig,
    store: &dyn store::AnnotationStore,
    stopwords: &StopwordSet,
    cancel: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> Result<Vec<GenerateReport>> {
    let specs = default_specs();
    let mut reports = Vec::new();
    for index_type in config.index_types.resolve() {
        let spec = specs.get(&index_type).expect("default_specs covers every IndexType");
        let generator = IndexGenerator::new(config, store, spec.as_ref(), stopwords, std::sync::Arc::clone(&cancel))?;
        reports.push(generator.generate_index()?);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::Epoch;
    use crate::store::AnnotationRow;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn generate_all_indexes_builds_every_selected_type() {
        let dir = TempDir::new().unwrap();
        let mut config = IndexerConfig::for_testing(dir.path().join("index"));
        config.index_types = IndexTypeSet::Only(
            [IndexType::Unigram, IndexType::Bigram].into_iter().collect(),
        );

        let rows = vec![AnnotationRow {
            document_id: 1,
            sentence_id: 1,
            begin_char: 0,
            end_char: 3,
            token: Some("cat".to_string()),
            lemma: Some("cat".to_string()),
            pos: Some("NN".to_string()),
            ner: None,
            normalized_ner: None,
            timestamp: Epoch::parse("2024-01-01").unwrap(),
        }];
        let store = InMemoryAnnotationStore::new(rows, Vec::new());
        let stopwords = StopwordSet::empty();
        let cancel = Arc::new(AtomicBool::new(false));

        let reports = generate_all_indexes(&config, &store, &stopwords, cancel).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(config.index_dir.join("unigram").join("manifest.json").exists());
        assert!(config.index_dir.join("bigram").join("manifest.json").exists());
    }
}
