//! Ordered on-disk key -> value store (spec §4.3), tuned for bulk sorted
//! ingest followed by random reads and range scans. Generalized from the
//! teacher's LSM engine (`storage/lsm/mod.rs`/`engine.rs`) down to the
//! shape this spec needs: one bulk load per generator run, never
//! incrementally compacted, with an `lru`-backed block cache standing in
//! for the teacher's memtable on the read path.

mod bloom;
mod sstable;

use crate::error::{IndexError, Result};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sstable::{Segment, SegmentBuilder};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

const DEFAULT_SEGMENT_ENTRIES: usize = 250_000;
const BLOCK_CACHE_CAPACITY: usize = 256;

#[derive(Serialize, Deserialize)]
struct Manifest {
    segment_files: Vec<String>,
}

/// A key-ordered, write-once-per-run store. Built through
/// [`KVStoreBuilder`] from an already-sorted stream, then opened read-only.
pub struct KVStore {
    dir: PathBuf,
    segments: Vec<Segment>,
    /// Cache of recent `get` results keyed by the looked-up key, avoiding
    /// repeat block reads for hot keys (bloom filters already
    /// short-circuit misses that land here).
    cache: Mutex<LruCache<Vec<u8>, Option<Vec<u8>>>>,
}

impl KVStore {
    /// Opens a store directory previously populated by
    /// [`KVStoreBuilder::finish`].
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let manifest_path = dir.join("manifest.json");
        let manifest_bytes = std::fs::read(&manifest_path)?;
        let manifest: Manifest =
            serde_json::from_slice(&manifest_bytes).map_err(|e| IndexError::Serialization(e.to_string()))?;

        let mut segments = Vec::with_capacity(manifest.segment_files.len());
        for name in &manifest.segment_files {
            segments.push(Segment::open(dir.join(name))?);
        }

        Ok(KVStore {
            dir,
            segments,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(BLOCK_CACHE_CAPACITY).unwrap())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn num_entries(&self) -> u64 {
        self.segments.iter().map(|s| s.num_entries()).sum()
    }

    /// Point lookup. Segments hold disjoint, ascending key ranges (the
    /// builder only ever appends a fresh segment once the previous one is
    /// full), so at most one segment can contain `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().get(key) {
            return Ok(cached.clone());
        }
        for segment in &self.segments {
            if let Some(value) = segment.get(key)? {
                self.cache.lock().put(key.to_vec(), Some(value.clone()));
                return Ok(Some(value));
            }
        }
        self.cache.lock().put(key.to_vec(), None);
        Ok(None)
    }

    /// Streams every `(key, value)` pair across all segments in ascending
    /// order, optionally bounded to `[start, end)`.
    pub fn range_scan(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for segment in &self.segments {
            for entry in segment.iter()? {
                let (key, value) = entry?;
                if let Some(start) = start {
                    if key.as_slice() < start {
                        continue;
                    }
                }
                if let Some(end) = end {
                    if key.as_slice() >= end {
                        break;
                    }
                }
                out.push((key, value));
            }
        }
        Ok(out)
    }
}

/// Bulk-load writer. Callers must supply entries in ascending key order
/// (the `ExternalMerger`'s output stream already satisfies this); entries
/// are sharded across fixed-size segment files as they arrive.
pub struct KVStoreBuilder {
    dir: PathBuf,
    segment_files: Vec<String>,
    current: Option<SegmentBuilder>,
    current_count: usize,
    segment_entries: usize,
    next_segment_id: u32,
}

impl KVStoreBuilder {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(KVStoreBuilder {
            dir,
            segment_files: Vec::new(),
            current: None,
            current_count: 0,
            segment_entries: DEFAULT_SEGMENT_ENTRIES,
            next_segment_id: 0,
        })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.current.is_none() {
            self.open_next_segment()?;
        }
        self.current.as_mut().unwrap().add(key, value)?;
        self.current_count += 1;
        if self.current_count >= self.segment_entries {
            self.close_current_segment()?;
        }
        Ok(())
    }

    /// Convenience for writing many already-sorted entries at once.
    pub fn write_batch<'a>(&mut self, entries: impl IntoIterator<Item = (&'a [u8], &'a [u8])>) -> Result<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    fn open_next_segment(&mut self) -> Result<()> {
        let name = format!("segment-{:08}.chr", self.next_segment_id);
        self.next_segment_id += 1;
        let builder = SegmentBuilder::new(self.dir.join(&name), self.segment_entries)?;
        self.segment_files.push(name);
        self.current = Some(builder);
        self.current_count = 0;
        Ok(())
    }

    fn close_current_segment(&mut self) -> Result<()> {
        if let Some(builder) = self.current.take() {
            builder.finish()?;
        }
        Ok(())
    }

    /// Flushes the final segment and writes the manifest, returning the
    /// directory the store was built in.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.close_current_segment()?;
        let manifest = Manifest { segment_files: self.segment_files };
        let bytes = serde_json::to_vec_pretty(&manifest).map_err(|e| IndexError::Serialization(e.to_string()))?;
        std::fs::write(self.dir.join("manifest.json"), bytes)?;
        Ok(self.dir)
    }
}
