use crate::error::{Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, normalize, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::Position;
use crate::posting::PostingList;
use crate::store::{Row, RowKind};
use std::collections::HashMap;

/// Key = `lower(pos)`, filtered to non-null, non-blank tags (spec §4.7).
pub struct PosIndexSpec;

impl IndexSpec for PosIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::Pos
    }

    fn row_kind(&self) -> RowKind {
        RowKind::Annotation
    }

    fn uses_synonyms(&self) -> bool {
        false
    }

    fn process_partition(&self, rows: &[Row], _ctx: &ProcessContext) -> Result<(PostingsOutput, SkipReasonCounts)> {
        let mut postings: HashMap<Vec<u8>, PostingList<Position>> = HashMap::new();
        let mut skipped = SkipReasonCounts::new();

        for row in rows {
            let Row::Annotation(row) = row else { continue };
            let Some(pos_tag) = &row.pos else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            let pos_tag = normalize(pos_tag);
            if pos_tag.is_empty() {
                skipped.record(SkipReason::NullRequiredField);
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
            postings.entry(join_key(&[&pos_tag])).or_insert_with(PostingList::new).push(position);
        }

        for list in postings.values_mut() {
            list.sort();
        }
        Ok((PostingsOutput::Position(postings), skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::Epoch;
    use crate::stopwords::StopwordSet;
    use crate::store::AnnotationRow;

    fn row(pos: Option<&str>) -> Row {
        Row::Annotation(AnnotationRow {
            document_id: 1,
            sentence_id: 1,
            begin_char: 0,
            end_char: 2,
            token: None,
            lemma: None,
            pos: pos.map(str::to_string),
            ner: None,
            normalized_ner: None,
            timestamp: Epoch::parse("2024-01-01").unwrap(),
        })
    }

    #[test]
    fn blank_and_null_pos_are_skipped() {
        let rows = vec![row(Some("NN")), row(Some("  ")), row(None)];
        let stopwords = StopwordSet::empty();
        let blacklist = Default::default();
        let prefixes = Vec::new();
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };

        let (PostingsOutput::Position(postings), skipped) = PosIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert_eq!(postings.len(), 1);
        assert!(postings.contains_key(b"nn".as_slice()));
        assert_eq!(skipped.total(), 2);
    }
}
