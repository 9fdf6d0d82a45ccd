use crate::error::{Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, normalize, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::Position;
use crate::posting::PostingList;
use crate::store::{Row, RowKind};
use std::collections::HashMap;

/// Key = `head ⊕ relation ⊕ dependent`, filtered to relations outside the
/// configured blacklist and tokens that are non-empty, non-stopword (spec
/// §4.7).
pub struct DependencyIndexSpec;

impl IndexSpec for DependencyIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::Dependency
    }

    fn row_kind(&self) -> RowKind {
        RowKind::Dependency
    }

    fn uses_synonyms(&self) -> bool {
        false
    }

    fn process_partition(&self, rows: &[Row], ctx: &ProcessContext) -> Result<(PostingsOutput, SkipReasonCounts)> {
        let mut postings: HashMap<Vec<u8>, PostingList<Position>> = HashMap::new();
        let mut skipped = SkipReasonCounts::new();

        for row in rows {
            let Row::Dependency(row) = row else { continue };
            if ctx.dependency_relation_blacklist.contains(&row.relation) {
                skipped.record(SkipReason::BlacklistedRelation);
                continue;
            }
            let head = normalize(&row.head_token);
            let dependent = normalize(&row.dependent_token);
            if head.is_empty() || dependent.is_empty() {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            }
            if ctx.stopwords.contains(&head) || ctx.stopwords.contains(&dependent) {
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
            postings
                .entry(join_key(&[&head, &row.relation, &dependent]))
                .or_insert_with(PostingList::new)
                .push(position);
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
    use crate::store::DependencyRow;
    use std::collections::HashSet;

    fn row(head: &str, relation: &str, dependent: &str) -> Row {
        Row::Dependency(DependencyRow {
            document_id: 1,
            sentence_id: 1,
            begin_char: 0,
            end_char: 10,
            head_token: head.to_string(),
            dependent_token: dependent.to_string(),
            relation: relation.to_string(),
            timestamp: Epoch::parse("2024-01-01").unwrap(),
        })
    }

    #[test]
    fn blacklisted_relations_are_excluded() {
        let rows = vec![row("eat", "nsubj", "cat"), row("eat", "det", "the")];
        let stopwords = StopwordSet::empty();
        let blacklist: HashSet<String> = ["det".to_string()].into_iter().collect();
        let prefixes = Vec::new();
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };

        let (PostingsOutput::Position(postings), skipped) = DependencyIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert_eq!(postings.len(), 1);
        assert!(postings.contains_key(join_key(&["eat", "nsubj", "cat"]).as_slice()));
        assert_eq!(skipped.get(SkipReason::BlacklistedRelation), 1);
    }

    #[test]
    fn stopword_heads_or_dependents_are_excluded() {
        let rows = vec![row("run", "nsubj", "the"), row("eat", "nsubj", "cat")];
        let stopwords = StopwordSet::from_words(["the"]);
        let blacklist = HashSet::new();
        let prefixes = Vec::new();
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };
        let (PostingsOutput::Position(postings), skipped) = DependencyIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert_eq!(postings.len(), 1);
        assert!(postings.contains_key(join_key(&["eat", "nsubj", "cat"]).as_slice()));
        assert_eq!(skipped.get(SkipReason::Stopword), 1);
    }
}
