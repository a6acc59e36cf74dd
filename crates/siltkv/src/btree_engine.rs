//! The standalone durable B-Tree engine.
//!
//! All reads are served from the in-memory tree; durability comes from the
//! WAL. Every mutation is appended (and fsynced, when `wal_sync` is on)
//! before the tree is touched, so an unclean shutdown loses nothing — the
//! next open replays the log. A clean [`close`](BTreeEngine::close) persists
//! the live entries as a snapshot file and truncates the WAL, making the
//! following open replay-free.
//!
//! ## Directory layout
//!
//! ```text
//! <dir>/wal.log     append-only mutation log
//! <dir>/snapshot    record-codec file of live entries, written on close
//! ```

use anyhow::{ensure, Context, Result};
use btree::BTree;
use sstable::{Entry, MAX_KEY_BYTES, MAX_VALUE_BYTES};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use wal::{WalReader, WalRecord, WalWriter};

use crate::StorageEngine;

/// Name of the write-ahead log inside the engine directory.
pub const WAL_FILENAME: &str = "wal.log";
/// Name of the close-time snapshot inside the engine directory.
pub const SNAPSHOT_FILENAME: &str = "snapshot";

/// A B-Tree paired with a WAL, satisfying the full [`StorageEngine`]
/// contract on its own.
///
/// Deletes insert tombstones rather than restructuring the tree; a
/// tombstoned key reads as absent and is dropped from the snapshot on
/// close.
pub struct BTreeEngine {
    dir: PathBuf,
    tree: BTree<Entry>,
    wal: WalWriter,
    wal_path: PathBuf,
    snapshot_path: PathBuf,
    wal_sync: bool,
}

impl BTreeEngine {
    /// Opens (or creates) the engine in `dir`.
    ///
    /// Recovery: load the snapshot if one exists, then replay the WAL on
    /// top of it. Replay is idempotent with respect to the snapshot — a
    /// crash between snapshot write and WAL truncation just reapplies
    /// mutations the snapshot already reflects.
    pub fn open<P: AsRef<Path>>(dir: P, min_degree: usize, wal_sync: bool) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let wal_path = dir.join(WAL_FILENAME);
        let snapshot_path = dir.join(SNAPSHOT_FILENAME);

        let mut tree = BTree::new(min_degree);
        let snapshot_entries = load_snapshot(&snapshot_path, &mut tree)?;
        let replayed = replay_wal(&wal_path, &mut tree)?;

        let wal = WalWriter::create(&wal_path, wal_sync)?;

        info!(
            dir = %dir.display(),
            snapshot_entries,
            replayed,
            "opened B-Tree engine"
        );

        Ok(Self {
            dir,
            tree,
            wal,
            wal_path,
            snapshot_path,
            wal_sync,
        })
    }

    /// Returns the number of entries in the tree (tombstones included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the tree holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl StorageEngine for BTreeEngine {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
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
        self.tree.insert(key, Entry::Value(value));
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .tree
            .get(key)
            .and_then(|entry| entry.as_value().map(|v| v.to_vec())))
    }

    fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        ensure!(!key.is_empty(), "key must not be empty");

        self.wal.append(&WalRecord::Del { key: key.clone() })?;
        self.tree.insert(key, Entry::Tombstone);
        Ok(())
    }

    /// Persists the live entries as a snapshot (tmp + fsync + rename), then
    /// truncates the WAL. Tombstones are dropped — the snapshot replaces
    /// all history, so they have nothing left to shadow.
    fn close(&mut self) -> Result<()> {
        let tmp_path = self.dir.join(format!("{}.tmp", SNAPSHOT_FILENAME));
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| format!("failed to create {}", tmp_path.display()))?;
            let mut w = BufWriter::new(file);

            let mut live = 0usize;
            for (key, entry) in self.tree.items() {
                if entry.is_tombstone() {
                    continue;
                }
                sstable::write_record(&mut w, key, entry)?;
                live += 1;
            }
            w.flush()?;
            w.get_ref().sync_all()?;
            debug!(live, "snapshot written");
        }
        std::fs::rename(&tmp_path, &self.snapshot_path)
            .with_context(|| format!("failed to commit {}", self.snapshot_path.display()))?;

        // Everything in the WAL is covered by the snapshot now.
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.wal_path)?;
        self.wal = WalWriter::create(&self.wal_path, self.wal_sync)?;

        info!(dir = %self.dir.display(), "closed B-Tree engine");
        Ok(())
    }
}

/// Loads a snapshot file into the tree, returning the entry count. An
/// absent snapshot is a fresh start.
fn load_snapshot(path: &Path, tree: &mut BTree<Entry>) -> Result<u64> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to open snapshot {}", path.display())))
        }
    };

    let mut reader = BufReader::new(file);
    let mut loaded = 0u64;
    while let Some((key, entry)) = sstable::read_record(&mut reader)
        .with_context(|| format!("corrupt snapshot {}", path.display()))?
    {
        tree.insert(key, entry);
        loaded += 1;
    }
    Ok(loaded)
}

/// Replays the WAL into the tree, returning the record count. An absent WAL
/// is a fresh start.
fn replay_wal(path: &Path, tree: &mut BTree<Entry>) -> Result<u64> {
    let mut reader = match WalReader::open(path) {
        Ok(r) => r,
        Err(wal::WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to open WAL {} for replay", path.display())))
        }
    };

    let mut applied = 0u64;
    reader
        .replay(|record| {
            match record {
                WalRecord::Put { key, value } => tree.insert(key, Entry::Value(value)),
                WalRecord::Del { key } => tree.insert(key, Entry::Tombstone),
            }
            applied += 1;
        })
        .with_context(|| format!("failed to replay WAL {}", path.display()))?;
    Ok(applied)
}
