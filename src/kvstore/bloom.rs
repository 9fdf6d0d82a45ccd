//! Bloom filter for fast negative lookups, generalized from the teacher's
//! `storage/lsm/bloom.rs` `BloomFilter` (same double-hashing scheme, same
//! on-disk layout) to operate on arbitrary byte-slice keys instead of a
//! fixed `u64`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub struct BloomFilter {
    bits: Vec<u8>,
    num_hashes: u32,
    num_bits: usize,
}

impl BloomFilter {
    pub fn new(num_keys: usize, bits_per_key: usize) -> Self {
        let num_keys = num_keys.max(1);
        let num_bits = (num_keys * bits_per_key).max(8);
        let num_bytes = (num_bits + 7) / 8;
        let num_hashes = ((bits_per_key as f64) * 0.693).ceil() as u32;
        let num_hashes = num_hashes.clamp(1, 30);
        BloomFilter { bits: vec![0u8; num_bytes], num_hashes, num_bits }
    }

    pub fn insert(&mut self, key: &[u8]) {
        for i in 0..self.num_hashes {
            let bit_pos = (self.hash(key, i) as usize) % self.num_bits;
            self.set_bit(bit_pos);
        }
    }

    pub fn may_contain(&self, key: &[u8]) -> bool {
        for i in 0..self.num_hashes {
            let bit_pos = (self.hash(key, i) as usize) % self.num_bits;
            if !self.get_bit(bit_pos) {
                return false;
            }
        }
        true
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12 + self.bits.len());
        buf.extend_from_slice(&self.num_hashes.to_le_bytes());
        buf.extend_from_slice(&(self.num_bits as u64).to_le_bytes());
        buf.extend_from_slice(&self.bits);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }
        let num_hashes = u32::from_le_bytes(data[0..4].try_into().ok()?);
        let num_bits = u64::from_le_bytes(data[4..12].try_into().ok()?) as usize;
        let bits = data[12..].to_vec();
        Some(BloomFilter { bits, num_hashes, num_bits })
    }

    fn hash(&self, key: &[u8], seed: u32) -> u64 {
        let mut hasher = DefaultHasher::new();
        seed.hash(&mut hasher);
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn set_bit(&mut self, pos: usize) {
        self.bits[pos / 8] |= 1 << (pos % 8);
    }

    fn get_bit(&self, pos: usize) -> bool {
        self.bits[pos / 8] & (1 << (pos % 8)) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_keys_are_always_reported_present() {
        let mut bloom = BloomFilter::new(100, 10);
        for i in 0..100u32 {
            bloom.insert(&i.to_be_bytes());
        }
        for i in 0..100u32 {
            assert!(bloom.may_contain(&i.to_be_bytes()));
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut bloom = BloomFilter::new(10, 10);
        bloom.insert(b"hello");
        let bytes = bloom.to_bytes();
        let restored = BloomFilter::from_bytes(&bytes).unwrap();
        assert!(restored.may_contain(b"hello"));
    }

    #[test]
    fn false_positive_rate_stays_reasonable() {
        let mut bloom = BloomFilter::new(1_000, 10);
        for i in 0..1_000u32 {
            bloom.insert(&i.to_be_bytes());
        }
        let mut false_positives = 0;
        for i in 1_000..2_000u32 {
            if bloom.may_contain(&i.to_be_bytes()) {
                false_positives += 1;
            }
        }
        assert!(false_positives < 50, "false positive rate too high: {false_positives}/1000");
    }
}
