use crate::error::{Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, normalize, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::Position;
use crate::posting::PostingList;
use crate::store::{AnnotationRow, Row, RowKind};
use std::collections::HashMap;

/// Key = `NER ⊕ lower(mention text)`. Consecutive same-entity tokens in the
/// same `(document_id, sentence_id)` with adjacent spans are merged into
/// one mention (spec §4.7's NER multi-token merging rule); `DATE`-tagged
/// rows belong to the NER_DATE variant instead.
pub struct NerIndexSpec;

impl IndexSpec for NerIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::Ner
    }

    fn row_kind(&self) -> RowKind {
        RowKind::Annotation
    }

    fn uses_synonyms(&self) -> bool {
        false
    }

    fn process_partition(&self, rows: &[Row], _ctx: &ProcessContext) -> Result<(PostingsOutput, SkipReasonCounts)> {
        let mut skipped = SkipReasonCounts::new();
        let tagged: Vec<&AnnotationRow> = rows
            .iter()
            .filter_map(|r| if let Row::Annotation(a) = r { Some(a) } else { None })
            .filter(|a| match a.ner.as_deref() {
                Some(ner) if ner.eq_ignore_ascii_case("DATE") => {
                    skipped.record(SkipReason::NotDateNer);
                    false
                }
                Some(_) => true,
                None => {
                    skipped.record(SkipReason::NullRequiredField);
                    false
                }
            })
            .collect();

        let mut postings: HashMap<Vec<u8>, PostingList<Position>> = HashMap::new();
        let mut i = 0;
        while i < tagged.len() {
            let first = tagged[i];
            let ner = first.ner.as_deref().unwrap();
            let mut j = i + 1;
            let mut last = first;
            let mut tokens = vec![first.token.as_deref().unwrap_or("").to_string()];
            while j < tagged.len() {
                let next = tagged[j];
                let same_group = next.document_id == first.document_id
                    && next.sentence_id == first.sentence_id
                    && next.ner.as_deref() == Some(ner)
                    && last.end_char <= next.begin_char
                    && next.begin_char <= last.end_char + 2;
                if !same_group {
                    break;
                }
                tokens.push(next.token.as_deref().unwrap_or("").to_string());
                last = next;
                j += 1;
            }

            let mention = tokens.join(" ");
            let mention = normalize(&mention);
            if let Some(position) = Position::new(
                first.document_id as u32,
                first.sentence_id as u32,
                first.begin_char as u32,
                last.end_char as u32,
                first.timestamp,
            ) {
                postings.entry(join_key(&[ner, &mention])).or_insert_with(PostingList::new).push(position);
            }

            i = j;
        }

        for list in postings.values_mut() {
            list.sort();
        }
        Ok(PostingsOutput::Position(postings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::Epoch;
    use crate::stopwords::StopwordSet;

    fn row(begin: i64, end: i64, token: &str, ner: Option<&str>) -> Row {
        Row::Annotation(AnnotationRow {
            document_id: 1,
            sentence_id: 1,
            begin_char: begin,
            end_char: end,
            token: Some(token.to_string()),
            lemma: Some(token.to_string()),
            pos: None,
            ner: ner.map(str::to_string),
            normalized_ner: None,
            timestamp: Epoch::parse("2024-01-01").unwrap(),
        })
    }

    #[test]
    fn merges_multi_token_organization_mention() {
        let rows = vec![
            row(0, 3, "New", Some("ORGANIZATION")),
            row(4, 11, "Zealand", Some("ORGANIZATION")),
            row(12, 16, "Army", Some("ORGANIZATION")),
            row(17, 22, "Corps", Some("ORGANIZATION")),
        ];
        let stopwords = StopwordSet::empty();
        let blacklist = Default::default();
        let prefixes = Vec::new();
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };

        let (PostingsOutput::Position(postings), skipped) = NerIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert_eq!(postings.len(), 1);
        let key = join_key(&["ORGANIZATION", "new zealand army corps"]);
        let list = &postings[key.as_slice()];
        assert_eq!(list.len(), 1);
        assert_eq!(list.as_slice()[0].begin_char, 0);
        assert_eq!(list.as_slice()[0].end_char, 22);
        assert_eq!(skipped.total(), 0);
    }

    #[test]
    fn date_tagged_rows_are_excluded() {
        let rows = vec![row(0, 3, "2024", Some("DATE"))];
        let stopwords = StopwordSet::empty();
        let blacklist = Default::default();
        let prefixes = Vec::new();
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };
        let (PostingsOutput::Position(postings), skipped) = NerIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert!(postings.is_empty());
        assert_eq!(skipped.get(SkipReason::NotDateNer), 1);
    }
}
