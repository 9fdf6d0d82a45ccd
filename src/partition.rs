//! Document-atomic partitioning (spec §4.6.1): splits a fetched batch into
//! up to `worker_count` partitions for parallel processing, never splitting
//! a single document's rows across partitions.
//!
//! Grounded on the teacher's `index/vamana/diskann_index.rs` batch-dispatch
//! loop, which likewise chunks a unit of work (there, vector ids; here,
//! documents) before handing chunks to a `rayon` worker pool.

use crate::store::Row;
use std::collections::HashMap;

/// Splits `batch` into partitions satisfying spec §4.6.1:
/// - every row of a given `document_id` lands in exactly one partition;
/// - partition count is `min(worker_count, distinct_document_count)`;
/// - `|partition| <= 2 * avg_partition_size` whenever documents are
///   roughly balanced in size (an outsized document may still dominate
///   its own partition alone);
/// - row order within a document is preserved.
pub fn partition_entries(batch: Vec<Row>, worker_count: usize) -> Vec<Vec<Row>> {
    if batch.is_empty() {
        return Vec::new();
    }

    let mut doc_order: Vec<i64> = Vec::new();
    let mut by_doc: HashMap<i64, Vec<Row>> = HashMap::new();
    for row in batch {
        let doc_id = row.document_id();
        by_doc.entry(doc_id).or_insert_with(|| {
            doc_order.push(doc_id);
            Vec::new()
        });
        by_doc.get_mut(&doc_id).unwrap().push(row);
    }

    let partition_count = worker_count.max(1).min(doc_order.len());
    let mut partitions: Vec<Vec<Row>> = (0..partition_count).map(|_| Vec::new()).collect();
    let mut partition_sizes = vec![0usize; partition_count];

    // Longest-processing-time-first bin packing: biggest documents placed
    // first, always into the currently-smallest partition. Keeps
    // partitions within 2x of the average even under skewed document
    // sizes, while never splitting a document.
    let mut docs: Vec<i64> = doc_order;
    docs.sort_by_key(|doc_id| std::cmp::Reverse(by_doc[doc_id].len()));

    for doc_id in docs {
        let rows = by_doc.remove(&doc_id).unwrap();
        let (target, _) = partition_sizes
            .iter()
            .enumerate()
            .min_by_key(|(_, size)| **size)
            .expect("partition_count >= 1");
        partition_sizes[target] += rows.len();
        partitions[target].extend(rows);
    }

    partitions.into_iter().filter(|p| !p.is_empty()).collect()
}
