use crate::date::Epoch;
use crate::error::{IndexError, Result, SkipReason, SkipReasonCounts};
use crate::index_types::{join_key, normalize, IndexSpec, IndexType, PostingsOutput, ProcessContext};
use crate::position::{AnnotationType, Position, StitchPosition};
use crate::posting::PostingList;
use crate::store::{AnnotationRow, Row, RowKind};
use crate::synonym::SynonymNamespace;
use std::collections::HashMap;

/// Key = `lemma ⊕ AnnotationType`, cross-producing each sentence's
/// non-stopword lemmas against the distinct DATE/NER/POS facets that
/// co-occur in the same `(document_id, sentence_id)` (spec §4.7). The
/// spec's AnnotationType also names a DEPENDENCY facet, but that would
/// require reading the `dependencies` table alongside `annotations` for
/// every sentence; this variant is scoped to the facets derivable from
/// `annotations` alone (DATE, NER, POS).
pub struct StitchIndexSpec;

fn annotation_type_name(ty: AnnotationType) -> &'static str {
    match ty {
        AnnotationType::Date => "DATE",
        AnnotationType::Ner => "NER",
        AnnotationType::Pos => "POS",
        AnnotationType::Dependency => "DEPENDENCY",
    }
}

fn namespace_for(ty: AnnotationType) -> SynonymNamespace {
    match ty {
        AnnotationType::Date => SynonymNamespace::Date,
        AnnotationType::Ner => SynonymNamespace::Ner,
        AnnotationType::Pos => SynonymNamespace::Pos,
        AnnotationType::Dependency => SynonymNamespace::Dependency,
    }
}

/// Distinct `(AnnotationType, value)` facets present in one sentence's rows.
fn sentence_facets(rows: &[&AnnotationRow]) -> Vec<(AnnotationType, String)> {
    let mut facets: Vec<(AnnotationType, String)> = Vec::new();
    let mut push_unique = |ty: AnnotationType, value: String| {
        if !facets.iter().any(|(t, v)| *t == ty && *v == value) {
            facets.push((ty, value));
        }
    };

    for row in rows {
        if let Some(ner) = &row.ner {
            if ner.eq_ignore_ascii_case("DATE") {
                if let Some(normalized) = &row.normalized_ner {
                    if let Ok(date) = Epoch::parse(normalized) {
                        push_unique(AnnotationType::Date, date.to_iso());
                    }
                }
            } else {
                push_unique(AnnotationType::Ner, ner.clone());
            }
        }
        if let Some(pos_tag) = &row.pos {
            let value = normalize(pos_tag);
            if !value.is_empty() {
                push_unique(AnnotationType::Pos, value);
            }
        }
    }
    facets
}

impl IndexSpec for StitchIndexSpec {
    fn index_type(&self) -> IndexType {
        IndexType::Stitch
    }

    fn row_kind(&self) -> RowKind {
        RowKind::Annotation
    }

    fn uses_synonyms(&self) -> bool {
        true
    }

    fn process_partition(&self, rows: &[Row], ctx: &ProcessContext) -> Result<(PostingsOutput, SkipReasonCounts)> {
        let synonyms = ctx.synonyms.ok_or_else(|| IndexError::Config("stitch index requires a synonym table".into()))?;

        let mut by_sentence: HashMap<(i64, i64), Vec<&AnnotationRow>> = HashMap::new();
        for row in rows {
            let Row::Annotation(row) = row else { continue };
            by_sentence.entry((row.document_id, row.sentence_id)).or_default().push(row);
        }

        let mut postings: HashMap<Vec<u8>, PostingList<StitchPosition>> = HashMap::new();
        let mut skipped = SkipReasonCounts::new();

        for sentence_rows in by_sentence.values() {
            let facets = sentence_facets(sentence_rows);
            if facets.is_empty() {
                skipped.record(SkipReason::NullRequiredField);
                continue;
            }

            for row in sentence_rows {
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

                for (annotation_type, value) in &facets {
                    let synonym_id = synonyms.get_or_create(namespace_for(*annotation_type), value)?;
                    let key = join_key(&[&lemma, annotation_type_name(*annotation_type)]);
                    postings
                        .entry(key)
                        .or_insert_with(PostingList::new)
                        .push(StitchPosition::new(position, *annotation_type, synonym_id));
                }
            }
        }

        for list in postings.values_mut() {
            list.sort();
        }
        Ok((PostingsOutput::Stitch(postings), skipped))
    }
}
