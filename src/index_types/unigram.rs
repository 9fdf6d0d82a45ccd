use crate::error::{Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, normalize, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::Position;
use crate::posting::PostingList;
use crate::store::{Row, RowKind};
use std::collections::HashMap;

/// Key = `lemma`, filtered to non-null, non-stopword lemmas (spec §4.7).
pub struct UnigramIndexSpec;

impl IndexSpec for UnigramIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::Unigram
    }

    fn row_kind(&self) -> RowKind {
        RowKind::Annotation
    }

    fn uses_synonyms(&self) -> bool {
        false
    }

    fn process_partition(&self, rows: &[Row], ctx: &ProcessContext) -> Result<(PostingsOutput, SkipReasonCounts)> {
        let mut postings: HashMap<Vec<u8>, PostingList<Position>> = HashMap::new();
        let mut skipped = SkipReasonCounts::new();

        for row in rows {
            let Row::Annotation(row) = row else { continue };
            let Some(lemma) = &row.lemma else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            let lemma = normalize(lemma);
            if lemma.is_empty() {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            }
            if ctx.stopwords.contains(&lemma) {
                skipped.record(SkipReason::Stopword);
                continue;
            }
            let Some(position) = Position::new(
                row.document_id as u32,
                row.sentence_id as u32,
                row.begin_char as u32,
                row.end_char as u32,
                row.timestamp,
            ) else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            postings.entry(join_key(&[&lemma])).or_insert_with(PostingList::new).push(position);
        }

        for list in postings.values_mut() {
            list.sort();
        }
        Ok((PostingsOutput::Position(postings), skipped))
    }
}
