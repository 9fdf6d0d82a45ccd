//! Immutable sorted segment file, generalized from the teacher's
//! `storage/lsm/sstable.rs` `SSTable`/`SSTableBuilder`: same file shape
//! (data blocks, block index, bloom filter, fixed-size footer with a magic
//! number), but keyed by `Vec<u8>` instead of `u64` so it can hold the
//! NUL-joined composite keys spec §4.1 describes, and written once in
//! bulk-load order rather than incrementally compacted — this crate never
//! mutates a segment after `finish()`.

use crate::error::{IndexError, Result};
use crate::kvstore::bloom::BloomFilter;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const SEGMENT_MAGIC: u32 = 0x4348_524E; // "CHRN"
const SEGMENT_VERSION: u32 = 1;
const FOOTER_SIZE: usize = 40;
const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
const DEFAULT_BITS_PER_KEY: usize = 10;

struct Footer {
    magic: u32,
    version: u32,
    index_offset: u64,
    index_size: u32,
    bloom_offset: u64,
    bloom_size: u32,
    num_entries: u64,
}

impl Footer {
    fn serialize(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.index_size.to_le_bytes());
        buf[20..28].copy_from_slice(&self.bloom_offset.to_le_bytes());
        buf[28..32].copy_from_slice(&self.bloom_size.to_le_bytes());
        buf[32..40].copy_from_slice(&self.num_entries.to_le_bytes());
        buf
    }

    fn deserialize(data: &[u8], path: &Path) -> Result<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(IndexError::CorruptPosting {
                path: Some(path.to_path_buf()),
                reason: "segment footer truncated".into(),
            });
        }
        let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
        if magic != SEGMENT_MAGIC {
            return Err(IndexError::CorruptPosting {
                path: Some(path.to_path_buf()),
                reason: format!("bad segment magic: {magic:#x}"),
            });
        }
        Ok(Footer {
            magic,
            version: u32::from_le_bytes(data[4..8].try_into().unwrap()),
            index_offset: u64::from_le_bytes(data[8..16].try_into().unwrap()),
            index_size: u32::from_le_bytes(data[16..20].try_into().unwrap()),
            bloom_offset: u64::from_le_bytes(data[20..28].try_into().unwrap()),
            bloom_size: u32::from_le_bytes(data[28..32].try_into().unwrap()),
            num_entries: u64::from_le_bytes(data[32..40].try_into().unwrap()),
        })
    }
}

/// `(first_key, offset, compressed_size)` for each data block, kept
/// entirely in memory for binary search (spec-sized indexes are a small
/// fraction of posting data).
struct BlockIndex {
    entries: Vec<(Vec<u8>, u64, u32)>,
}

impl BlockIndex {
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (key, offset, size) in &self.entries {
            buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
            buf.extend_from_slice(key);
            buf.extend_from_slice(&offset.to_le_bytes());
            buf.extend_from_slice(&size.to_le_bytes());
        }
        buf
    }

    fn deserialize(data: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| IndexError::CorruptPosting { path: None, reason: reason.into() };
        if data.len() < 4 {
            return Err(corrupt("block index truncated"));
        }
        let count = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let mut pos = 4;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            if pos + 4 > data.len() {
                return Err(corrupt("block index entry truncated"));
            }
            let key_len = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + key_len + 12 > data.len() {
                return Err(corrupt("block index entry truncated"));
            }
            let key = data[pos..pos + key_len].to_vec();
            pos += key_len;
            let offset = u64::from_le_bytes(data[pos..pos + 8].try_into().unwrap());
            pos += 8;
            let size = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap());
            pos += 4;
            entries.push((key, offset, size));
        }
        Ok(BlockIndex { entries })
    }

    /// Index of the last block whose first key is `<= key`, or `None` if
    /// `key` sorts before every block.
    fn find_block_index(&self, key: &[u8]) -> Option<usize> {
        match self.entries.binary_search_by(|(k, _, _)| k.as_slice().cmp(key)) {
            Ok(idx) => Some(idx),
            Err(0) => None,
            Err(idx) => Some(idx - 1),
        }
    }
}

struct DataBlock {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl DataBlock {
    fn new() -> Self {
        DataBlock { entries: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn approx_size(&self) -> usize {
        self.entries.iter().map(|(k, v)| k.len() + v.len() + 8).sum()
    }

    fn serialize_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (k, v) in &self.entries {
            buf.extend_from_slice(&(k.len() as u32).to_le_bytes());
            buf.extend_from_slice(k);
            buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
            buf.extend_from_slice(v);
        }
        buf
    }

    fn deserialize_raw(data: &[u8]) -> Result<Self> {
        let corrupt = |reason: &str| IndexError::CorruptPosting { path: None, reason: reason.into() };
        if data.len() < 4 {
            return Err(corrupt("data block truncated"));
        }
        let count = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let mut pos = 4;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            if pos + 4 > data.len() {
                return Err(corrupt("data block entry truncated"));
            }
            let klen = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + klen + 4 > data.len() {
                return Err(corrupt("data block entry truncated"));
            }
            let key = data[pos..pos + klen].to_vec();
            pos += klen;
            let vlen = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + vlen > data.len() {
                return Err(corrupt("data block entry truncated"));
            }
            let value = data[pos..pos + vlen].to_vec();
            pos += vlen;
            entries.push((key, value));
        }
        Ok(DataBlock { entries })
    }

    /// Compresses with Snappy, prefixed with a 1-byte flag and a CRC32C
    /// checksum of the uncompressed payload (spec §6's "every on-disk
    /// block is checksummed").
    fn encode(&self) -> Vec<u8> {
        let raw = self.serialize_raw();
        let checksum = crc32fast::hash(&raw);
        let compressed = snap::raw::Encoder::new().compress_vec(&raw).expect("snappy encode");
        let (flag, payload) = if compressed.len() < raw.len() { (1u8, compressed) } else { (0u8, raw) };
        let mut out = Vec::with_capacity(payload.len() + 5);
        out.push(flag);
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&payload);
        out
    }

    fn decode(data: &[u8], path: &Path) -> Result<Self> {
        if data.len() < 5 {
            return Err(IndexError::CorruptPosting {
                path: Some(path.to_path_buf()),
                reason: "block header truncated".into(),
            });
        }
        let flag = data[0];
        let expected_checksum = u32::from_le_bytes(data[1..5].try_into().unwrap());
        let payload = &data[5..];
        let raw = match flag {
            0 => payload.to_vec(),
            1 => snap::raw::Decoder::new().decompress_vec(payload).map_err(|e| IndexError::CorruptPosting {
                path: Some(path.to_path_buf()),
                reason: format!("snappy decode failed: {e}"),
            })?,
            other => {
                return Err(IndexError::CorruptPosting {
                    path: Some(path.to_path_buf()),
                    reason: format!("unknown block compression flag: {other}"),
                })
            }
        };
        if crc32fast::hash(&raw) != expected_checksum {
            return Err(IndexError::CorruptPosting {
                path: Some(path.to_path_buf()),
                reason: "block checksum mismatch".into(),
            });
        }
        Self::deserialize_raw(&raw)
    }
}

/// Bulk-load writer: callers must `add` keys in strictly ascending order.
pub struct SegmentBuilder {
    writer: BufWriter<File>,
    path: PathBuf,
    current_block: DataBlock,
    index: BlockIndex,
    bloom: BloomFilter,
    block_size: usize,
    offset: u64,
    num_entries: u64,
    last_key: Option<Vec<u8>>,
}

impl SegmentBuilder {
    pub fn new(path: impl AsRef<Path>, estimated_keys: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&path)?;
        Ok(SegmentBuilder {
            writer: BufWriter::with_capacity(64 * 1024, file),
            path,
            current_block: DataBlock::new(),
            index: BlockIndex { entries: Vec::new() },
            bloom: BloomFilter::new(estimated_keys.max(1), DEFAULT_BITS_PER_KEY),
            block_size: DEFAULT_BLOCK_SIZE,
            offset: 0,
            num_entries: 0,
            last_key: None,
        })
    }

    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key <= last.as_slice() {
                return Err(IndexError::StoreWrite(format!(
                    "segment keys must be strictly ascending: {:?} did not follow {:?}",
                    key, last
                )));
            }
        }
        self.last_key = Some(key.to_vec());
        self.bloom.insert(key);
        self.num_entries += 1;
        self.current_block.entries.push((key.to_vec(), value.to_vec()));
        if self.current_block.approx_size() >= self.block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.current_block.is_empty() {
            return Ok(());
        }
        let first_key = self.current_block.entries[0].0.clone();
        let encoded = self.current_block.encode();
        let size = encoded.len() as u32;
        self.index.entries.push((first_key, self.offset, size));
        self.writer.write_all(&encoded)?;
        self.offset += size as u64;
        self.current_block = DataBlock::new();
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.flush_block()?;

        let index_offset = self.offset;
        let index_bytes = self.index.serialize();
        self.writer.write_all(&index_bytes)?;
        self.offset += index_bytes.len() as u64;

        let bloom_offset = self.offset;
        let bloom_bytes = self.bloom.to_bytes();
        self.writer.write_all(&bloom_bytes)?;
        self.offset += bloom_bytes.len() as u64;

        let footer = Footer {
            magic: SEGMENT_MAGIC,
            version: SEGMENT_VERSION,
            index_offset,
            index_size: index_bytes.len() as u32,
            bloom_offset,
            bloom_size: bloom_bytes.len() as u32,
            num_entries: self.num_entries,
        };
        self.writer.write_all(&footer.serialize())?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(self.path)
    }
}

/// Read-only handle onto a finished segment.
pub struct Segment {
    path: PathBuf,
    file: std::sync::Mutex<File>,
    index: BlockIndex,
    bloom: BloomFilter,
    num_entries: u64,
}

impl Segment {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        if (file_len as usize) < FOOTER_SIZE {
            return Err(IndexError::CorruptPosting { path: Some(path), reason: "segment too small".into() });
        }

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer_buf = [0u8; FOOTER_SIZE];
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::deserialize(&footer_buf, &path)?;

        file.seek(SeekFrom::Start(footer.index_offset))?;
        let mut index_buf = vec![0u8; footer.index_size as usize];
        file.read_exact(&mut index_buf)?;
        let index = BlockIndex::deserialize(&index_buf)?;

        file.seek(SeekFrom::Start(footer.bloom_offset))?;
        let mut bloom_buf = vec![0u8; footer.bloom_size as usize];
        file.read_exact(&mut bloom_buf)?;
        let bloom = BloomFilter::from_bytes(&bloom_buf)
            .ok_or_else(|| IndexError::CorruptPosting { path: Some(path.clone()), reason: "invalid bloom filter".into() })?;

        Ok(Segment { path, file: std::sync::Mutex::new(file), index, bloom, num_entries: footer.num_entries })
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if !self.bloom.may_contain(key) {
            return Ok(None);
        }
        let Some(block_idx) = self.index.find_block_index(key) else { return Ok(None) };
        let block = self.read_block(block_idx)?;
        Ok(block.entries.into_iter().find(|(k, _)| k == key).map(|(_, v)| v))
    }

    fn read_block(&self, block_idx: usize) -> Result<DataBlock> {
        let (_, offset, size) = self.index.entries[block_idx];
        let mut file = self.file.lock().expect("segment file mutex poisoned");
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        file.read_exact(&mut buf)?;
        DataBlock::decode(&buf, &self.path)
    }

    /// Streams every `(key, value)` pair in ascending order.
    pub fn iter(&self) -> Result<SegmentIter<'_>> {
        Ok(SegmentIter { segment: self, block_idx: 0, current: Vec::new().into_iter(), file: BufReader::new(File::open(&self.path)?) })
    }
}

pub struct SegmentIter<'a> {
    segment: &'a Segment,
    block_idx: usize,
    current: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    file: BufReader<File>,
}

impl<'a> Iterator for SegmentIter<'a> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current.next() {
                return Some(Ok(entry));
            }
            if self.block_idx >= self.segment.index.entries.len() {
                return None;
            }
            let (_, offset, size) = self.segment.index.entries[self.block_idx];
            self.block_idx += 1;
            if let Err(e) = self.file.seek(SeekFrom::Start(offset)) {
                return Some(Err(IndexError::Io(e)));
            }
            let mut buf = vec![0u8; size as usize];
            if let Err(e) = self.file.read_exact(&mut buf) {
                return Some(Err(IndexError::Io(e)));
            }
            match DataBlock::decode(&buf, &self.segment.path) {
                Ok(block) => self.current = block.entries.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_and_reads_back_sorted_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg.chr");
        let mut builder = SegmentBuilder::new(&path, 100).unwrap();
        for i in 0u32..200 {
            builder.add(&i.to_be_bytes(), format!("value-{i}").as_bytes()).unwrap();
        }
        builder.finish().unwrap();

        let segment = Segment::open(&path).unwrap();
        assert_eq!(segment.num_entries(), 200);
        let value = segment.get(&50u32.to_be_bytes()).unwrap().unwrap();
        assert_eq!(value, b"value-50");
        assert!(segment.get(&9999u32.to_be_bytes()).unwrap().is_none());
    }

    #[test]
    fn iterates_all_entries_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg.chr");
        let mut builder = SegmentBuilder::new(&path, 10).unwrap();
        for i in 0u32..10 {
            builder.add(&i.to_be_bytes(), b"v").unwrap();
        }
        builder.finish().unwrap();

        let segment = Segment::open(&path).unwrap();
        let keys: Vec<Vec<u8>> = segment.iter().unwrap().map(|r| r.unwrap().0).collect();
        let expected: Vec<Vec<u8>> = (0u32..10).map(|i| i.to_be_bytes().to_vec()).collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn rejects_out_of_order_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seg.chr");
        let mut builder = SegmentBuilder::new(&path, 10).unwrap();
        builder.add(b"b", b"1").unwrap();
        assert!(builder.add(b"a", b"2").is_err());
    }

    #[test]
    fn detects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bogus.chr");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        assert!(Segment::open(&path).is_err());
    }
}
