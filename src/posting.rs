//! Sorted posting lists over `Position`/`StitchPosition` (spec §4.1):
//! push/sort/merge/merge_many plus a bit-exact serialization format.
//!
//! `merge_many`'s k-way merge is grounded on the teacher's
//! `storage/lsm/merging_iterator.rs`: a min-heap keyed on each source's
//! current head element, refilled from whichever source it just popped.

use crate::date::Epoch;
use crate::error::{IndexError, Result};
use crate::position::{AnnotationType, Position, StitchPosition};
use crate::varint::{decode_varint, encode_varint};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// A sorted sequence of `T` for one key. Duplicates are preserved —
/// posting-list semantics, not set semantics (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList<T> {
    items: Vec<T>,
}

impl<T: Ord + Copy> PostingList<T> {
    pub fn new() -> Self {
        PostingList { items: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        PostingList { items: Vec::with_capacity(cap) }
    }

    /// Appends without re-sorting (spec §4.1).
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Stable sort into the total order.
    pub fn sort(&mut self) {
        self.items.sort();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }

    /// Merges two already-sorted lists in O(n+m), preserving duplicates.
    pub fn merge(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.items.len() + other.items.len());
        let (mut i, mut j) = (0, 0);
        while i < self.items.len() && j < other.items.len() {
            if self.items[i] <= other.items[j] {
                out.push(self.items[i]);
                i += 1;
            } else {
                out.push(other.items[j]);
                j += 1;
            }
        }
        out.extend_from_slice(&self.items[i..]);
        out.extend_from_slice(&other.items[j..]);
        PostingList { items: out }
    }

    /// k-way merge of already-sorted lists via a min-heap keyed on each
    /// list's current head.
    pub fn merge_many(lists: &[Self]) -> Self {
        #[derive(Eq, PartialEq)]
        struct HeapEntry<T: Eq> {
            item: T,
            list_idx: usize,
            item_idx: usize,
        }
        impl<T: Ord> Ord for HeapEntry<T> {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.item
                    .cmp(&other.item)
                    .then_with(|| self.list_idx.cmp(&other.list_idx))
            }
        }
        impl<T: Ord> PartialOrd for HeapEntry<T> {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        let total: usize = lists.iter().map(|l| l.len()).sum();
        let mut out = Vec::with_capacity(total);
        let mut heap: BinaryHeap<Reverse<HeapEntry<T>>> = BinaryHeap::with_capacity(lists.len());

        for (list_idx, list) in lists.iter().enumerate() {
            if let Some(&item) = list.items.first() {
                heap.push(Reverse(HeapEntry { item, list_idx, item_idx: 0 }));
            }
        }

        while let Some(Reverse(entry)) = heap.pop() {
            out.push(entry.item);
            let next_idx = entry.item_idx + 1;
            if let Some(&item) = lists[entry.list_idx].items.get(next_idx) {
                heap.push(Reverse(HeapEntry { item, list_idx: entry.list_idx, item_idx: next_idx }));
            }
        }

        PostingList { items: out }
    }
}

/// Per-`Position` delta tracker shared by encode/decode so the two stay
/// symmetric by construction.
#[derive(Default)]
struct DeltaState {
    prev_doc: u32,
    prev_sent: u32,
    prev_begin: u32,
}

impl PostingList<Position> {
    /// Serializes to the layout described in spec §4.1: a varint count,
    /// then per-position a delta-encoded `(doc_id, sentence_id, begin_char)`
    /// reset at document/sentence boundaries, a raw `u16` span length and a
    /// raw `i32` days-since-epoch timestamp. The only hard guarantee is
    /// `deserialize(serialize(x)) == x`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint(self.items.len() as u64, &mut out);

        let mut state = DeltaState::default();
        for p in &self.items {
            let doc_changed = p.document_id != state.prev_doc;
            encode_varint((p.document_id - state.prev_doc) as u64, &mut out);
            if doc_changed {
                state.prev_sent = 0;
                state.prev_begin = 0;
            }

            let sent_changed = p.sentence_id != state.prev_sent;
            encode_varint((p.sentence_id - state.prev_sent) as u64, &mut out);
            if sent_changed {
                state.prev_begin = 0;
            }

            encode_varint((p.begin_char - state.prev_begin) as u64, &mut out);

            let length = (p.end_char - p.begin_char) as u16;
            out.extend_from_slice(&length.to_le_bytes());
            out.extend_from_slice(&p.timestamp.days_since_epoch().to_le_bytes());

            state.prev_doc = p.document_id;
            state.prev_sent = p.sentence_id;
            state.prev_begin = p.begin_char;
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;
        let (count, consumed) = decode_varint(bytes)?;
        cursor += consumed;

        let mut items = Vec::with_capacity(count as usize);
        let mut state = DeltaState::default();
        for _ in 0..count {
            let (doc_delta, c) = decode_varint(&bytes[cursor..])?;
            cursor += c;
            let document_id = state.prev_doc + doc_delta as u32;
            let doc_changed = document_id != state.prev_doc;
            if doc_changed {
                state.prev_sent = 0;
                state.prev_begin = 0;
            }

            let (sent_delta, c) = decode_varint(&bytes[cursor..])?;
            cursor += c;
            let sentence_id = state.prev_sent + sent_delta as u32;
            let sent_changed = sentence_id != state.prev_sent;
            if sent_changed {
                state.prev_begin = 0;
            }

            let (begin_delta, c) = decode_varint(&bytes[cursor..])?;
            cursor += c;
            let begin_char = state.prev_begin + begin_delta as u32;

            let length_bytes: [u8; 2] = bytes
                .get(cursor..cursor + 2)
                .ok_or_else(|| IndexError::CorruptPosting { path: None, reason: "truncated length".into() })?
                .try_into()
                .unwrap();
            cursor += 2;
            let length = u16::from_le_bytes(length_bytes) as u32;

            let days_bytes: [u8; 4] = bytes
                .get(cursor..cursor + 4)
                .ok_or_else(|| IndexError::CorruptPosting { path: None, reason: "truncated timestamp".into() })?
                .try_into()
                .unwrap();
            cursor += 4;
            let days = i32::from_le_bytes(days_bytes);

            let position = Position::new(
                document_id,
                sentence_id,
                begin_char,
                begin_char + length,
                Epoch::from_days_since_epoch(days),
            )
            .ok_or_else(|| IndexError::CorruptPosting { path: None, reason: "begin > end".into() })?;
            items.push(position);

            state.prev_doc = document_id;
            state.prev_sent = sentence_id;
            state.prev_begin = begin_char;
        }

        Ok(PostingList { items })
    }
}

impl PostingList<StitchPosition> {
    /// Same scheme as `PostingList<Position>`, with `annotation_type` (one
    /// byte) and `synonym_id` (varint) appended per record.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        encode_varint(self.items.len() as u64, &mut out);

        let mut state = DeltaState::default();
        for sp in &self.items {
            let p = &sp.position;
            let doc_changed = p.document_id != state.prev_doc;
            encode_varint((p.document_id - state.prev_doc) as u64, &mut out);
            if doc_changed {
                state.prev_sent = 0;
                state.prev_begin = 0;
            }
            let sent_changed = p.sentence_id != state.prev_sent;
            encode_varint((p.sentence_id - state.prev_sent) as u64, &mut out);
            if sent_changed {
                state.prev_begin = 0;
            }
            encode_varint((p.begin_char - state.prev_begin) as u64, &mut out);
            let length = (p.end_char - p.begin_char) as u16;
            out.extend_from_slice(&length.to_le_bytes());
            out.extend_from_slice(&p.timestamp.days_since_epoch().to_le_bytes());
            out.push(annotation_type_tag(sp.annotation_type));
            encode_varint(sp.synonym_id as u64, &mut out);

            state.prev_doc = p.document_id;
            state.prev_sent = p.sentence_id;
            state.prev_begin = p.begin_char;
        }
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;
        let (count, consumed) = decode_varint(bytes)?;
        cursor += consumed;

        let mut items = Vec::with_capacity(count as usize);
        let mut state = DeltaState::default();
        for _ in 0..count {
            let (doc_delta, c) = decode_varint(&bytes[cursor..])?;
            cursor += c;
            let document_id = state.prev_doc + doc_delta as u32;
            if document_id != state.prev_doc {
                state.prev_sent = 0;
                state.prev_begin = 0;
            }

            let (sent_delta, c) = decode_varint(&bytes[cursor..])?;
            cursor += c;
            let sentence_id = state.prev_sent + sent_delta as u32;
            if sentence_id != state.prev_sent {
                state.prev_begin = 0;
            }

            let (begin_delta, c) = decode_varint(&bytes[cursor..])?;
            cursor += c;
            let begin_char = state.prev_begin + begin_delta as u32;

            let length = u16::from_le_bytes(
                bytes
                    .get(cursor..cursor + 2)
                    .ok_or_else(|| IndexError::CorruptPosting { path: None, reason: "truncated length".into() })?
                    .try_into()
                    .unwrap(),
            ) as u32;
            cursor += 2;

            let days = i32::from_le_bytes(
                bytes
                    .get(cursor..cursor + 4)
                    .ok_or_else(|| IndexError::CorruptPosting { path: None, reason: "truncated timestamp".into() })?
                    .try_into()
                    .unwrap(),
            );
            cursor += 4;

            let tag = *bytes
                .get(cursor)
                .ok_or_else(|| IndexError::CorruptPosting { path: None, reason: "truncated annotation tag".into() })?;
            cursor += 1;
            let annotation_type = annotation_type_from_tag(tag)?;

            let (synonym_id, c) = decode_varint(&bytes[cursor..])?;
            cursor += c;

            let position = Position::new(
                document_id,
                sentence_id,
                begin_char,
                begin_char + length,
                Epoch::from_days_since_epoch(days),
            )
            .ok_or_else(|| IndexError::CorruptPosting { path: None, reason: "begin > end".into() })?;

            items.push(StitchPosition::new(position, annotation_type, synonym_id as u32));

            state.prev_doc = document_id;
            state.prev_sent = sentence_id;
            state.prev_begin = begin_char;
        }

        Ok(PostingList { items })
    }
}

fn annotation_type_tag(t: AnnotationType) -> u8 {
    match t {
        AnnotationType::Date => 0,
        AnnotationType::Ner => 1,
        AnnotationType::Pos => 2,
        AnnotationType::Dependency => 3,
    }
}

fn annotation_type_from_tag(tag: u8) -> Result<AnnotationType> {
    match tag {
        0 => Ok(AnnotationType::Date),
        1 => Ok(AnnotationType::Ner),
        2 => Ok(AnnotationType::Pos),
        3 => Ok(AnnotationType::Dependency),
        _ => Err(IndexError::CorruptPosting { path: None, reason: format!("unknown annotation tag {tag}") }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn pos(doc: u32, sent: u32, begin: u32, end: u32, day: i32) -> Position {
        Position::new(doc, sent, begin, end, Epoch::from_days_since_epoch(day)).unwrap()
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let mut list = PostingList::new();
        list.push(pos(1, 0, 0, 5, 10));
        list.push(pos(1, 0, 6, 9, 10));
        list.push(pos(1, 1, 0, 2, 10));
        list.push(pos(2, 0, 0, 1, 20));
        list.push(pos(2, 0, 0, 1, 20)); // duplicate preserved
        list.sort();

        let bytes = list.serialize();
        let decoded = PostingList::<Position>::deserialize(&bytes).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn round_trip_holds_over_random_inputs() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let mut list = PostingList::new();
            let n = rng.gen_range(0..40);
            for _ in 0..n {
                let doc = rng.gen_range(0..5);
                let sent = rng.gen_range(0..4);
                let begin = rng.gen_range(0..100);
                let end = begin + rng.gen_range(0..20);
                let day = rng.gen_range(0..20000);
                list.push(pos(doc, sent, begin, end, day));
            }
            list.sort();
            let bytes = list.serialize();
            let decoded = PostingList::<Position>::deserialize(&bytes).unwrap();
            assert_eq!(decoded, list);
        }
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = PostingList::new();
        a.push(pos(1, 0, 0, 1, 1));
        a.push(pos(3, 0, 0, 1, 1));
        let mut b = PostingList::new();
        b.push(pos(2, 0, 0, 1, 1));
        b.push(pos(3, 0, 0, 1, 1));
        a.sort();
        b.sort();

        assert_eq!(a.merge(&b), b.merge(&a));
    }

    #[test]
    fn merge_preserves_duplicates() {
        let mut a = PostingList::new();
        a.push(pos(1, 0, 0, 1, 1));
        let mut b = PostingList::new();
        b.push(pos(1, 0, 0, 1, 1));
        let merged = a.merge(&b);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_many_matches_pairwise_merge() {
        let mut lists = Vec::new();
        for base in 0..5u32 {
            let mut l = PostingList::new();
            for i in 0..10u32 {
                l.push(pos(base, i % 3, i, i + 1, (base * 10 + i) as i32));
            }
            l.sort();
            lists.push(l);
        }

        let merged_many = PostingList::merge_many(&lists);
        let mut merged_pairwise = PostingList::new();
        for l in &lists {
            merged_pairwise = merged_pairwise.merge(l);
        }
        assert_eq!(merged_many, merged_pairwise);
    }

    #[test]
    fn stitch_position_round_trips() {
        let mut list: PostingList<StitchPosition> = PostingList::new();
        list.push(StitchPosition::new(pos(1, 0, 0, 5, 100), AnnotationType::Ner, 7));
        list.push(StitchPosition::new(pos(1, 0, 0, 5, 100), AnnotationType::Pos, 3));
        list.push(StitchPosition::new(pos(2, 1, 4, 9, 200), AnnotationType::Date, 42));
        list.sort();

        let bytes = list.serialize();
        let decoded = PostingList::<StitchPosition>::deserialize(&bytes).unwrap();
        assert_eq!(decoded, list);
    }
}
