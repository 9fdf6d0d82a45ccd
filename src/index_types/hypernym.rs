use crate::error::{Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, normalize, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::Position;
use crate::posting::PostingList;
use crate::store::{Row, RowKind};
use std::collections::HashMap;

/// Key = `head ⊕ dependent`, for dependency rows whose relation starts with
/// one of the configured hypernym prefixes (e.g. `nmod:such_as`,
/// `nmod:including`, spec §4.7). `DependencyRow` carries surface tokens
/// rather than separate lemma fields, so `head_token`/`dependent_token`
/// stand in for the spec's head/dep lemma.
pub struct HypernymIndexSpec;

impl IndexSpec for HypernymIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::Hypernym
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
            if !ctx.hypernym_relation_prefixes.iter().any(|prefix| row.relation.starts_with(prefix.as_str())) {
                skipped.record(SkipReason::BlacklistedRelation);
                continue;
            }
            let head = normalize(&row.head_token);
            let dependent = normalize(&row.dependent_token);
            if head.is_empty() || dependent.is_empty() {
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
            postings.entry(join_key(&[&head, &dependent])).or_insert_with(PostingList::new).push(position);
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
            end_char: 20,
            head_token: head.to_string(),
            dependent_token: dependent.to_string(),
            relation: relation.to_string(),
            timestamp: Epoch::parse("2024-01-01").unwrap(),
        })
    }

    #[test]
    fn only_matching_relation_prefixes_are_kept() {
        let rows = vec![row("fruit", "nmod:such_as", "apple"), row("fruit", "nsubj", "orange")];
        let stopwords = StopwordSet::empty();
        let blacklist = HashSet::new();
        let prefixes = vec!["nmod:such_as".to_string(), "nmod:including".to_string()];
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };

        let (PostingsOutput::Position(postings), skipped) = HypernymIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert_eq!(postings.len(), 1);
        assert!(postings.contains_key(join_key(&["fruit", "apple"]).as_slice()));
        assert_eq!(skipped.get(SkipReason::BlacklistedRelation), 1);
    }

    #[test]
    fn prefix_match_is_a_prefix_not_an_exact_match() {
        let rows = vec![row("fruit", "nmod:including_extra", "mango")];
        let stopwords = StopwordSet::empty();
        let blacklist = HashSet::new();
        let prefixes = vec!["nmod:including".to_string()];
        let ctx = ProcessContext {
            stopwords: &stopwords,
            synonyms: None,
            dependency_relation_blacklist: &blacklist,
            hypernym_relation_prefixes: &prefixes,
        };
        let (PostingsOutput::Position(postings), _skipped) = HypernymIndexSpec.process_partition(&rows, &ctx).unwrap() else {
            panic!()
        };
        assert_eq!(postings.len(), 1);
    }
}
