//! Spilled, sorted `(key, serialized PostingList)` run files (spec §4.4):
//! what a partition's in-memory accumulator is flushed to once the
//! `MemoryGovernor` signals pressure. Same block/footer shape as
//! `kvstore::sstable`'s segments — both are grounded on the teacher's
//! `storage/lsm/sstable.rs` — but run files are a transient merge input,
//! never opened for random point lookups, only streamed front-to-back.

use crate::error::{IndexError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const RUN_MAGIC: u32 = 0x4348_524D; // "CHRM"

/// Appends sorted `(key, value)` records to a run file, compressing each
/// fixed-size record block with Snappy the same way `kvstore` segments do.
pub struct RunFileWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
    pending_size: usize,
    block_size: usize,
    last_key: Option<Vec<u8>>,
    record_count: u64,
}

impl RunFileWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&RUN_MAGIC.to_le_bytes())?;
        Ok(RunFileWriter {
            writer,
            path,
            pending: Vec::new(),
            pending_size: 0,
            block_size: 64 * 1024,
            last_key: None,
            record_count: 0,
        })
    }

    pub fn write(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(last) = &self.last_key {
            if key < last.as_slice() {
                return Err(IndexError::SpillIo {
                    path: self.path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "run file keys must be sorted"),
                });
            }
        }
        self.last_key = Some(key.to_vec());
        self.record_count += 1;
        self.pending_size += key.len() + value.len() + 8;
        self.pending.push((key.to_vec(), value.to_vec()));
        if self.pending_size >= self.block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut raw = Vec::new();
        raw.extend_from_slice(&(self.pending.len() as u32).to_le_bytes());
        for (k, v) in &self.pending {
            raw.extend_from_slice(&(k.len() as u32).to_le_bytes());
            raw.extend_from_slice(k);
            raw.extend_from_slice(&(v.len() as u32).to_le_bytes());
            raw.extend_from_slice(v);
        }
        let checksum = crc32fast::hash(&raw);
        let compressed = snap::raw::Encoder::new().compress_vec(&raw).expect("snappy encode");
        let (flag, payload) = if compressed.len() < raw.len() { (1u8, compressed) } else { (0u8, raw) };

        self.writer.write_all(&(payload.len() as u32 + 5).to_le_bytes())?;
        self.writer.write_all(&[flag])?;
        self.writer.write_all(&checksum.to_le_bytes())?;
        self.writer.write_all(&payload)?;

        self.pending.clear();
        self.pending_size = 0;
        Ok(())
    }

    /// Flushes the trailing block and returns the finished file's path and
    /// record count.
    pub fn finish(mut self) -> Result<(PathBuf, u64)> {
        self.flush_block()?;
        self.writer.flush()?;
        Ok((self.path, self.record_count))
    }
}

/// Forward-only streaming reader over a file written by [`RunFileWriter`].
pub struct RunFileReader {
    reader: BufReader<File>,
    path: PathBuf,
    current: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    exhausted: bool,
}

impl RunFileReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::new(File::open(&path)?);
        let mut magic_buf = [0u8; 4];
        reader.read_exact(&mut magic_buf)?;
        if u32::from_le_bytes(magic_buf) != RUN_MAGIC {
            return Err(IndexError::CorruptPosting { path: Some(path), reason: "bad run file magic".into() });
        }
        Ok(RunFileReader { reader, path, current: Vec::new().into_iter(), exhausted: false })
    }

    fn load_next_block(&mut self) -> Result<bool> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(IndexError::Io(e)),
        }
        let block_len = u32::from_le_bytes(len_buf) as usize;
        let mut block_buf = vec![0u8; block_len];
        self.reader.read_exact(&mut block_buf)?;

        let flag = block_buf[0];
        let expected_checksum = u32::from_le_bytes(block_buf[1..5].try_into().unwrap());
        let payload = &block_buf[5..];
        let raw = match flag {
            0 => payload.to_vec(),
            1 => snap::raw::Decoder::new().decompress_vec(payload).map_err(|e| IndexError::CorruptPosting {
                path: Some(self.path.clone()),
                reason: format!("snappy decode failed: {e}"),
            })?,
            other => {
                return Err(IndexError::CorruptPosting {
                    path: Some(self.path.clone()),
                    reason: format!("unknown run block flag: {other}"),
                })
            }
        };
        if crc32fast::hash(&raw) != expected_checksum {
            return Err(IndexError::CorruptPosting { path: Some(self.path.clone()), reason: "run block checksum mismatch".into() });
        }

        let corrupt = || IndexError::CorruptPosting { path: Some(self.path.clone()), reason: "run block truncated".into() };
        if raw.len() < 4 {
            return Err(corrupt());
        }
        let count = u32::from_le_bytes(raw[0..4].try_into().unwrap()) as usize;
        let mut pos = 4;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            if pos + 4 > raw.len() {
                return Err(corrupt());
            }
            let klen = u32::from_le_bytes(raw[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + klen + 4 > raw.len() {
                return Err(corrupt());
            }
            let key = raw[pos..pos + klen].to_vec();
            pos += klen;
            let vlen = u32::from_le_bytes(raw[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if pos + vlen > raw.len() {
                return Err(corrupt());
            }
            let value = raw[pos..pos + vlen].to_vec();
            pos += vlen;
            entries.push((key, value));
        }
        self.current = entries.into_iter();
        Ok(true)
    }
}

impl Iterator for RunFileReader {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        loop {
            if let Some(entry) = self.current.next() {
                return Some(Ok(entry));
            }
            match self.load_next_block() {
                Ok(true) => continue,
                Ok(false) => {
                    self.exhausted = true;
                    return None;
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
