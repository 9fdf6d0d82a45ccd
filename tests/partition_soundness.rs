//! Partition soundness (spec §8) over randomized inputs: regardless of how
//! many documents, how skewed their sizes, or how many workers are
//! requested, `partition_entries` must never split a document across
//! partitions and must account for every input row exactly once.

use chronodex::store::{AnnotationRow, Row};
use chronodex::Epoch;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

fn row(doc: i64, sent: i64) -> Row {
    Row::Annotation(AnnotationRow {
        document_id: doc,
        sentence_id: sent,
        begin_char: 0,
        end_char: 1,
        token: Some("x".into()),
        lemma: Some("x".into()),
        pos: None,
        ner: None,
        normalized_ner: None,
        timestamp: Epoch::parse("2024-01-01").unwrap(),
    })
}

#[test]
fn random_batches_never_split_a_document_and_account_for_every_row() {
    let mut rng = StdRng::seed_from_u64(7);

    for trial in 0..200 {
        let doc_count = rng.gen_range(0..30);
        let worker_count = rng.gen_range(1..9);

        let mut batch = Vec::new();
        for doc in 0..doc_count {
            let row_count = rng.gen_range(1..25);
            for sent in 0..row_count {
                batch.push(row(doc, sent));
            }
        }
        let total_in = batch.len();

        let partitions = chronodex::partition::partition_entries(batch, worker_count);

        let total_out: usize = partitions.iter().map(|p| p.len()).sum();
        assert_eq!(total_out, total_in, "trial {trial}: every row must appear exactly once across partitions");

        let mut partition_of: HashMap<i64, usize> = HashMap::new();
        for (idx, partition) in partitions.iter().enumerate() {
            for r in partition {
                let doc_id = r.document_id();
                if let Some(&seen_idx) = partition_of.get(&doc_id) {
                    assert_eq!(seen_idx, idx, "trial {trial}: document {doc_id} split across partitions");
                } else {
                    partition_of.insert(doc_id, idx);
                }
            }
        }

        if doc_count > 0 {
            assert!(!partitions.is_empty(), "trial {trial}: non-empty input must yield at least one partition");
            assert!(
                partitions.len() <= (worker_count as usize).min(doc_count as usize),
                "trial {trial}: partition count must not exceed min(worker_count, distinct documents)"
            );
        } else {
            assert!(partitions.is_empty(), "trial {trial}: empty input must yield no partitions");
        }
    }
}
