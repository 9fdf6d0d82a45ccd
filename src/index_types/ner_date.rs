use crate::date::Epoch;
use crate::error::{Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::Position;
use crate::posting::PostingList;
use crate::store::{Row, RowKind};
use std::collections::HashMap;

/// Key = `yyyyMMdd`, for `DATE`-tagged rows whose `normalized_ner` is a
/// legal `YYYY-MM-DD` calendar date (spec §4.7). Invalid dates are
/// row-skipped, not fatal.
pub struct NerDateIndexSpec;

impl IndexSpec for NerDateIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::NerDate
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
            let Some(ner) = &row.ner else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            if !ner.eq_ignore_ascii_case("DATE") {
                skipped.record(SkipReason::NotDateNer);
                continue;
            }
            let Some(normalized) = &row.normalized_ner else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            let Ok(date) = Epoch::parse(normalized) else {
                skipped.record(SkipReason::InvalidDate);
                continue;
            };

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
            postings.entry(join_key(&[&date.to_yyyymmdd()])).or_insert_with(PostingList::new).push(position);
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
    use crate::stopwords::StopwordSet;
    use crate::store::AnnotationRow;

    fn row(normalized: Option<&str>) -> Row {
        Row::Annotation(AnnotationRow {
            document_id: 1,
            sentence_id: 1,
            begin_char: 0,
            end_char: 10,
            token: None,
            lemma: None,
            pos: None,
            ner: Some("DATE".to_string()),
            normalized_ner: normalized.map(str::to_string),
            timestamp: Epoch::parse("2024-01-01").unwrap(),
        })
    }

    #[test]
    fn valid_dates_group_under_one_key_invalid_dates_are_skipped() {
        let rows = vec![row(Some("2024-01-01")), row(Some("2024-01-01")), row(Some("2024-01-01")), row(Some("2024-02-30"))];
        let stopwords = StopwordSet::empty();
        let blacklist = Default::default();
        let prefixes = Vec::new();
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };

        let (PostingsOutput::Position(postings), skipped) = NerDateIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[b"20240101".as_slice()].len(), 3);
        assert_eq!(skipped.get(SkipReason::InvalidDate), 1);
    }
}
