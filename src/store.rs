//! The annotation store (spec §6): an external collaborator this crate
//! only ever reads from. `AnnotationStore` is the trait real callers
//! implement against their own relational store; `InMemoryAnnotationStore`
//! is a deterministic, in-process implementation used by this crate's own
//! tests and by callers doing dry runs.

use crate::date::Epoch;
use crate::error::Result;
use std::collections::HashMap;

/// `documents(document_id, timestamp)` (spec §3). Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document {
    pub document_id: i64,
    pub timestamp: Epoch,
}

/// One fetched row of `annotations`, already joined with its document's
/// timestamp (spec §3/§6). All fields but the ids and span are optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRow {
    pub document_id: i64,
    pub sentence_id: i64,
    pub begin_char: i64,
    pub end_char: i64,
    pub token: Option<String>,
    pub lemma: Option<String>,
    pub pos: Option<String>,
    pub ner: Option<String>,
    pub normalized_ner: Option<String>,
    pub timestamp: Epoch,
}

/// One fetched row of `dependencies` (spec §3/§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRow {
    pub document_id: i64,
    pub sentence_id: i64,
    pub begin_char: i64,
    pub end_char: i64,
    pub head_token: String,
    pub dependent_token: String,
    pub relation: String,
    pub timestamp: Epoch,
}

/// A fetched row of either kind, tagged so partitioning and key derivation
/// can stay generic over which table an index variant reads from (spec
/// §4.7's "Rows scanned" column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Annotation(AnnotationRow),
    Dependency(DependencyRow),
}

impl Row {
    pub fn document_id(&self) -> i64 {
        match self {
            Row::Annotation(r) => r.document_id,
            Row::Dependency(r) => r.document_id,
        }
    }

    pub fn sentence_id(&self) -> i64 {
        match self {
            Row::Annotation(r) => r.sentence_id,
            Row::Dependency(r) => r.sentence_id,
        }
    }
}

/// Which table an `IndexSpec` reads from (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Annotation,
    Dependency,
}

/// The external annotation store interface (spec §6): fetch SQL is
/// index-type-specific in the original system, but every variant's fetch
/// must order by `(document_id, sentence_id, begin_char)` and support
/// `(offset, limit)` pagination — that contract is captured here as two
/// paginated fetch methods rather than one per index type.
pub trait AnnotationStore: Send + Sync {
    fn fetch_annotation_batch(&self, offset: u64, limit: u32) -> Result<Vec<AnnotationRow>>;
    fn fetch_dependency_batch(&self, offset: u64, limit: u32) -> Result<Vec<DependencyRow>>;

    /// Dispatches to whichever fetch method `kind` names, wrapping results
    /// in `Row` so the generator can stay agnostic of the underlying table.
    fn fetch_batch(&self, kind: RowKind, offset: u64, limit: u32) -> Result<Vec<Row>> {
        match kind {
            RowKind::Annotation => {
                Ok(self.fetch_annotation_batch(offset, limit)?.into_iter().map(Row::Annotation).collect())
            }
            RowKind::Dependency => {
                Ok(self.fetch_dependency_batch(offset, limit)?.into_iter().map(Row::Dependency).collect())
            }
        }
    }
}

/// A fixed, in-memory annotation store: rows are supplied up front and
/// paginated from a plain `Vec`. Useful for deterministic tests and for
/// callers who have already materialized their corpus into memory.
pub struct InMemoryAnnotationStore {
    annotations: Vec<AnnotationRow>,
    dependencies: Vec<DependencyRow>,
}

impl InMemoryAnnotationStore {
    pub fn new(annotations: Vec<AnnotationRow>, dependencies: Vec<DependencyRow>) -> Self {
        InMemoryAnnotationStore { annotations, dependencies }
    }

    pub fn documents(&self) -> HashMap<i64, Epoch> {
        let mut out = HashMap::new();
        for row in &self.annotations {
            out.insert(row.document_id, row.timestamp);
        }
        for row in &self.dependencies {
            out.insert(row.document_id, row.timestamp);
        }
        out
    }
}

impl AnnotationStore for InMemoryAnnotationStore {
    fn fetch_annotation_batch(&self, offset: u64, limit: u32) -> Result<Vec<AnnotationRow>> {
        Ok(page(&self.annotations, offset, limit))
    }

    fn fetch_dependency_batch(&self, offset: u64, limit: u32) -> Result<Vec<DependencyRow>> {
        Ok(page(&self.dependencies, offset, limit))
    }
}

fn page<T: Clone>(rows: &[T], offset: u64, limit: u32) -> Vec<T> {
    let start = (offset as usize).min(rows.len());
    let end = start.saturating_add(limit as usize).min(rows.len());
    rows[start..end].to_vec()
}
