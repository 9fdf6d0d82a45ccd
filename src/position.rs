//! Occurrence records (spec §3): `Position` and the stitch-index variant
//! `StitchPosition`. Immutable, totally ordered, cheap to copy.

use crate::date::Epoch;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One occurrence of a key in the corpus: `(document, sentence, char range,
/// date)`. Total order is `(document_id, sentence_id, begin_char, end_char,
/// timestamp)` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub document_id: u32,
    pub sentence_id: u32,
    pub begin_char: u32,
    pub end_char: u32,
    pub timestamp: Epoch,
}

impl Position {
    /// Builds a `Position`, enforcing `begin_char <= end_char` (spec §3's
    /// invariant). Malformed rows should be filtered out by the caller
    /// before reaching this constructor; this is the last line of defense.
    pub fn new(
        document_id: u32,
        sentence_id: u32,
        begin_char: u32,
        end_char: u32,
        timestamp: Epoch,
    ) -> Option<Self> {
        if begin_char > end_char {
            return None;
        }
        Some(Position { document_id, sentence_id, begin_char, end_char, timestamp })
    }

    fn sort_key(&self) -> (u32, u32, u32, u32, Epoch) {
        (self.document_id, self.sentence_id, self.begin_char, self.end_char, self.timestamp)
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Which kind of annotation a `StitchPosition`'s `synonym_id` refers to
/// (spec §3, §4.7 STITCH variant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnnotationType {
    Date,
    Ner,
    Pos,
    Dependency,
}

/// A `Position` extended with the id of a co-occurring annotation in the
/// same sentence (spec §3, §4.7 STITCH variant). Orders as `Position`,
/// tie-broken by `(annotation_type, synonym_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchPosition {
    pub position: Position,
    pub synonym_id: u32,
    pub annotation_type: AnnotationType,
}

impl StitchPosition {
    pub fn new(position: Position, annotation_type: AnnotationType, synonym_id: u32) -> Self {
        StitchPosition { position, synonym_id, annotation_type }
    }
}

impl PartialOrd for StitchPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StitchPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.annotation_type.cmp(&other.annotation_type))
            .then_with(|| self.synonym_id.cmp(&other.synonym_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(doc: u32, sent: u32, begin: u32, end: u32) -> Position {
        Position::new(doc, sent, begin, end, Epoch::parse("2024-01-01").unwrap()).unwrap()
    }

    #[test]
    fn rejects_inverted_ranges() {
        assert!(Position::new(1, 1, 5, 2, Epoch::parse("2024-01-01").unwrap()).is_none());
    }

    #[test]
    fn orders_by_document_then_sentence_then_span() {
        let a = pos(1, 0, 0, 5);
        let b = pos(1, 0, 6, 9);
        let c = pos(1, 1, 0, 2);
        let d = pos(2, 0, 0, 1);
        let mut v = vec![d, c, b, a];
        v.sort();
        assert_eq!(v, vec![a, b, c, d]);
    }

    #[test]
    fn stitch_position_tie_breaks_by_annotation_type_then_synonym_id() {
        let base = pos(1, 0, 0, 5);
        let a = StitchPosition::new(base, AnnotationType::Ner, 2);
        let b = StitchPosition::new(base, AnnotationType::Ner, 5);
        let c = StitchPosition::new(base, AnnotationType::Pos, 1);
        let mut v = vec![c, b, a];
        v.sort();
        assert_eq!(v, vec![a, b, c]);
    }
}
