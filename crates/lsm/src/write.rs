//! Write path: `put()`, `delete()`, and `flush()`.
//!
//! Every mutation is appended to the WAL before the memtable is touched.
//! When the memtable reaches the configured entry threshold it is persisted
//! to a new segment and the WAL restarts.

use anyhow::{ensure, Result};
use sstable::{write_segment, Entry, Segment, MAX_KEY_BYTES, MAX_VALUE_BYTES};
use std::fs::OpenOptions;
use tracing::info;
use wal::{WalRecord, WalWriter};

use crate::LsmTree;

impl LsmTree {
    /// Inserts a key-value pair.
    ///
    /// Appended to the WAL first (durable at fsync when `wal_sync` is on),
    /// then applied to the memtable. May trigger a flush.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_BYTES,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_BYTES
        );
        ensure!(
            value.len() <= MAX_VALUE_BYTES,
            "value too large: {} bytes (max {})",
            value.len(),
            MAX_VALUE_BYTES
        );

        self.wal.append(&WalRecord::Put {
            key: key.clone(),
            value: value.clone(),
        })?;
        self.memtable.insert(key, Entry::Value(value));

        self.maybe_flush()
    }

    /// Deletes a key by writing a tombstone.
    ///
    /// A delete is always a write — it never probes the segments for the
    /// key. The tombstone shadows any older value until compaction drops
    /// both.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");
        ensure!(
            key.len() <= MAX_KEY_BYTES,
            "key too large: {} bytes (max {})",
            key.len(),
            MAX_KEY_BYTES
        );

        self.wal.append(&WalRecord::Del { key: key.clone() })?;
        self.memtable.insert(key, Entry::Tombstone);

        self.maybe_flush()
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.memtable.len() >= self.config.memtable_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Flushes the memtable to a new segment. No-op when the memtable is
    /// empty.
    ///
    /// # Steps
    ///
    /// 1. Write a segment at the next generation from the memtable's sorted
    ///    items (atomic tmp + rename inside the writer).
    /// 2. Open the segment and append it to the segment list (newest).
    /// 3. Truncate the WAL — every record it held is now in the segment.
    /// 4. Reset the memtable.
    /// 5. Run compaction if the segment count reached the trigger.
    pub fn flush(&mut self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }

        let generation = self.next_generation;
        let entries: Vec<(Vec<u8>, Entry)> = self
            .memtable
            .items()
            .into_iter()
            .map(|(k, e)| (k.to_vec(), e.clone()))
            .collect();
        let count = entries.len();

        write_segment(
            &self.dir,
            generation,
            entries,
            count,
            self.config.bloom_false_positive_rate,
            self.config.sparse_index_stride,
        )?;

        let segment = Segment::open(&self.dir, generation)?;
        info!(generation, entries = count, "flushed memtable to segment");
        self.segments.push(segment);
        self.next_generation += 1;

        // The flushed records are durable in the segment; restart the WAL.
        self.reset_wal()?;
        self.memtable.clear();

        if self.config.compaction_trigger > 0
            && self.segments.len() >= self.config.compaction_trigger
        {
            self.compact()?;
        }

        Ok(())
    }

    /// Truncates the WAL file and reopens the writer in append mode.
    fn reset_wal(&mut self) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.wal_path)?;
        self.wal = WalWriter::create(&self.wal_path, self.config.wal_sync)?;
        Ok(())
    }
}
