use crate::error::{Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, normalize, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::Position;
use crate::posting::PostingList;
use crate::store::{AnnotationRow, Row, RowKind};
use std::collections::HashMap;

/// Key = `lemma1 ⊕ lemma2` for two consecutive tokens in the same
/// `(document_id, sentence_id)` (spec §4.7). Stopwords are kept.
pub struct BigramIndexSpec;

impl IndexSpec for BigramIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::Bigram
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

        for pair in annotations.windows(2) {
            let [a, b] = pair else { continue };
            if a.document_id != b.document_id || a.sentence_id != b.sentence_id {
                skipped.record(SkipReason::SentenceBoundary);
                continue;
            }
            let (Some(lemma_a), Some(lemma_b)) = (&a.lemma, &b.lemma) else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            let lemma_a = normalize(lemma_a);
            let lemma_b = normalize(lemma_b);
            if lemma_a.is_empty() || lemma_b.is_empty() {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            }
            let Some(position) =
                Position::new(a.document_id as u32, a.sentence_id as u32, a.begin_char as u32, b.end_char as u32, a.timestamp)
            else {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            };
            postings.entry(join_key(&[&lemma_a, &lemma_b])).or_insert_with(PostingList::new).push(position);
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

    fn row(doc: i64, sent: i64, begin: i64, end: i64, lemma: &str) -> Row {
        Row::Annotation(AnnotationRow {
            document_id: doc,
            sentence_id: sent,
            begin_char: begin,
            end_char: end,
            token: Some(lemma.to_string()),
            lemma: Some(lemma.to_string()),
            pos: None,
            ner: None,
            normalized_ner: None,
            timestamp: Epoch::parse("2024-01-01").unwrap(),
        })
    }

    fn ctx() -> (StopwordSet, std::collections::HashSet<String>, Vec<String>) {
        (StopwordSet::empty(), Default::default(), Vec::new())
    }

    #[test]
    fn never_crosses_sentence_boundary() {
        let rows = vec![row(1, 1, 0, 3, "the"), row(1, 1, 4, 9, "black"), row(1, 1, 10, 13, "cat"), row(1, 2, 0, 2, "it")];
        let (stopwords, blacklist, prefixes) = ctx();
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };

        let (PostingsOutput::Position(postings), skipped) = BigramIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert!(!postings.contains_key(b"cat\0it".as_slice()));
        let the_black = &postings[b"the\0black".as_slice()];
        assert_eq!(the_black.len(), 1);
        assert_eq!(the_black.as_slice()[0].begin_char, 0);
        assert_eq!(the_black.as_slice()[0].end_char, 9);
        assert_eq!(skipped.get(SkipReason::SentenceBoundary), 1);
    }
}
