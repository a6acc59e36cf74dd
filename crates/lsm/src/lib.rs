//! # LSM-Tree storage engine
//!
//! The orchestrator tying together the [`btree`], [`wal`], and [`sstable`]
//! crates into a log-structured merge-tree key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!   |
//!   v
//! ┌─────────────────────────────────────────────────┐
//! │                  LSM TREE                       │
//! │                                                 │
//! │ write.rs → WAL append → memtable insert         │
//! │              |                                  │
//! │              |  (entry count >= threshold?)     │
//! │              |            yes                   │
//! │              v                                  │
//! │           flush() → new segment                 │
//! │              |                                  │
//! │              |  (segment count >= trigger?)     │
//! │              |            yes                   │
//! │              v                                  │
//! │           compact() → single merged segment     │
//! │                                                 │
//! │ read.rs → memtable → segments (newest → oldest) │
//! │            (first match wins, tombstones hide)  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module          | Purpose                                             |
//! |-----------------|-----------------------------------------------------|
//! | `lib.rs`        | `LsmTree` struct, config, constructor, `Drop`       |
//! | [`recovery`]    | WAL replay, segment discovery, tmp file cleanup     |
//! | [`write`]       | `put()`, `delete()`, `flush()`                      |
//! | [`read`]        | `get()`, `fuzzy_get()`                              |
//! | [`compaction`]  | `compact()`: k-way merge + tombstone elimination    |
//! | [`levenshtein`] | edit distance for fuzzy key search                  |
//!
//! ## Crash safety
//!
//! Every mutation is appended to the WAL **before** touching the memtable,
//! so unflushed writes survive a crash. The WAL restarts only **after** a
//! successful flush. Segments are committed by writing `.tmp` files, fsyncing,
//! and renaming — sidecars first, data file last — so a half-written segment
//! is never observable. The segment list itself needs no manifest: the
//! generation number embedded in each filename recovers the order.

mod compaction;
pub mod levenshtein;
mod read;
mod recovery;
mod write;

use anyhow::Result;
use btree::BTree;
use sstable::{Entry, Segment};
use std::path::{Path, PathBuf};
use tracing::info;
use wal::WalWriter;

/// Name of the memtable write-ahead log inside the engine directory.
pub const WAL_FILENAME: &str = "wal.log";

/// Default number of memtable entries that triggers a flush.
pub const DEFAULT_MEMTABLE_THRESHOLD: usize = 1000;
/// Default minimum degree of the memtable B-Tree.
pub const DEFAULT_BTREE_MIN_DEGREE: usize = 3;
/// Default bloom filter target false positive rate.
pub const DEFAULT_BLOOM_FPR: f64 = 0.01;
/// Default sparse index stride (one sample every N records).
pub const DEFAULT_SPARSE_INDEX_STRIDE: usize = 100;
/// Default segment count that triggers compaction after a flush.
/// Zero disables automatic compaction.
pub const DEFAULT_COMPACTION_TRIGGER: usize = 4;

/// Construction-time tuning knobs for [`LsmTree`].
#[derive(Debug, Clone)]
pub struct LsmConfig {
    /// Memtable entry count that triggers a flush to a new segment.
    pub memtable_threshold: usize,
    /// Minimum degree of the memtable B-Tree.
    pub btree_min_degree: usize,
    /// Target false positive rate for segment bloom filters.
    pub bloom_false_positive_rate: f64,
    /// One sparse index sample every N records.
    pub sparse_index_stride: usize,
    /// Fsync the WAL on every append. Turning this off trades durability of
    /// the most recent writes for throughput.
    pub wal_sync: bool,
    /// Segment count that triggers compaction after a flush; 0 disables
    /// auto-compaction (the caller invokes [`LsmTree::compact`] directly).
    pub compaction_trigger: usize,
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            memtable_threshold: DEFAULT_MEMTABLE_THRESHOLD,
            btree_min_degree: DEFAULT_BTREE_MIN_DEGREE,
            bloom_false_positive_rate: DEFAULT_BLOOM_FPR,
            sparse_index_stride: DEFAULT_SPARSE_INDEX_STRIDE,
            wal_sync: true,
            compaction_trigger: DEFAULT_COMPACTION_TRIGGER,
        }
    }
}

/// A log-structured merge-tree over a single directory.
///
/// Owns the directory's contents exclusively while open: the memtable WAL
/// and one `.data`/`.index`/`.bloom` file trio per committed segment.
///
/// # Write path
///
/// 1. Append the mutation to the WAL (durable at fsync).
/// 2. Insert into the B-Tree memtable (a delete inserts a tombstone).
/// 3. When the memtable reaches `memtable_threshold` entries, flush it to a
///    new segment, restart the WAL, and reset the memtable.
///
/// # Read path
///
/// Memtable first, then segments newest to oldest, each gated by its bloom
/// filter. The first hit wins; a tombstone hit means "deleted".
pub struct LsmTree {
    dir: PathBuf,
    config: LsmConfig,
    memtable: BTree<Entry>,
    /// Committed segments, oldest to newest.
    segments: Vec<Segment>,
    /// Generation assigned to the next flushed or compacted segment;
    /// strictly greater than every live segment's generation.
    next_generation: u64,
    wal_path: PathBuf,
    wal: WalWriter,
}

impl LsmTree {
    /// Opens (or creates) an LSM tree in `dir` with default configuration.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open_with(dir, LsmConfig::default())
    }

    /// Opens (or creates) an LSM tree in `dir`.
    ///
    /// # Recovery steps
    ///
    /// 1. Create the directory if it does not exist.
    /// 2. Delete leftover `.tmp` files from interrupted flushes.
    /// 3. Discover committed segments from their filenames and open each one
    ///    (oldest to newest); the next generation is one past the newest.
    /// 4. Replay the WAL into a fresh memtable.
    /// 5. Open the WAL writer in append mode.
    pub fn open_with<P: AsRef<Path>>(dir: P, config: LsmConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        recovery::cleanup_tmp_files(&dir);

        let segments = recovery::load_segments(&dir)?;
        let next_generation = segments.last().map(|s| s.generation() + 1).unwrap_or(0);

        let wal_path = dir.join(WAL_FILENAME);
        let mut memtable = BTree::new(config.btree_min_degree);
        let replayed = recovery::replay_wal(&wal_path, &mut memtable)?;
        let wal = WalWriter::create(&wal_path, config.wal_sync)?;

        info!(
            dir = %dir.display(),
            segments = segments.len(),
            replayed,
            "opened LSM tree"
        );

        Ok(Self {
            dir,
            config,
            memtable,
            segments,
            next_generation,
            wal_path,
            wal,
        })
    }

    /// Returns the number of committed segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the number of entries in the memtable (tombstones included).
    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.memtable.len()
    }

    /// Returns the configuration the tree was opened with.
    #[must_use]
    pub fn config(&self) -> &LsmConfig {
        &self.config
    }

    /// Flushes a non-empty memtable so nothing lives only in memory, leaving
    /// the directory in a state that reopens without WAL replay.
    ///
    /// File handles are released when the tree is dropped.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        info!(dir = %self.dir.display(), "closed LSM tree");
        Ok(())
    }
}

impl std::fmt::Debug for LsmTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LsmTree")
            .field("dir", &self.dir)
            .field("memtable_entries", &self.memtable.len())
            .field("segments", &self.segments.len())
            .field("next_generation", &self.next_generation)
            .finish()
    }
}

/// Best-effort flush on drop.
///
/// Errors are ignored because `Drop` cannot propagate them — the data is
/// still safe in the WAL and will be recovered on the next open.
impl Drop for LsmTree {
    fn drop(&mut self) {
        if !self.memtable.is_empty() {
            let _ = self.flush();
        }
    }
}

#[cfg(test)]
mod tests;
