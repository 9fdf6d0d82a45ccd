use crate::error::{Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, normalize, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::Position;
use crate::posting::PostingList;
use crate::store::{AnnotationRow, Row, RowKind};
use std::collections::HashMap;

/// Key = `lemma1 ⊕ lemma2 ⊕ lemma3` for three consecutive tokens in the
/// same `(document_id, sentence_id)` (spec §4.7).
pub struct TrigramIndexSpec;

impl IndexSpec for TrigramIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::Trigram
    }

    fn row_kind(&self) -> RowKind {
        RowKind::Annotation
    }

    fn uses_synonyms(&self) -> bool {
        false
    }

    fn process_partition(&self, rows: &[Row], _ctx: &ProcessContext) -> Result<(PostingsOutput, SkipReasonCounts)> {
        let annotations: Vec<&AnnotationRow> =
            rows.iter().filter_map(|r| if let Row::Annotation(a) = r { Some(a) } else { None }).collect();

        let mut postings: HashMap<Vec<u8>, PostingList<Position>> = HashMap::new();
        let mut skipped = SkipReasonCounts::new();

        for triple in annotations.windows(3) {
            let [a, b, c] = triple else { continue };
            if a.document_id != b.document_id
                || b.document_id != c.document_id
                || a.sentence_id != b.sentence_id
                || b.sentence_id != c.sentence_id
            {
                skipped.record(SkipReason::SentenceBoundary);
                continue;
            }
            let (Some(l1), Some(l2), Some(l3)) = (&a.lemma, &b.lemma, &c.lemma) else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            let l1 = normalize(l1);
            let l2 = normalize(l2);
            let l3 = normalize(l3);
            if l1.is_empty() || l2.is_empty() || l3.is_empty() {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            }
            let Some(position) =
                Position::new(a.document_id as u32, a.sentence_id as u32, a.begin_char as u32, c.end_char as u32, a.timestamp)
            else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            postings.entry(join_key(&[&l1, &l2, &l3])).or_insert_with(PostingList::new).push(position);
        }

        for list in postings.values_mut() {
            list.sort();
        }
        Ok((PostingsOutput::Position(postings), skipped))
    }
}
