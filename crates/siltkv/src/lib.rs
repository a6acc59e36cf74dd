//! # siltkv - embedded key-value store with interchangeable engines
//!
//! A facade over two storage backends sharing one contract:
//!
//! - **`btree`** — a durable in-memory B-Tree: every mutation is logged to a
//!   WAL before it is applied, and a clean close persists a snapshot. Reads
//!   never touch disk.
//! - **`lsmtree`** — a log-structured merge-tree: writes buffer in a
//!   memtable and flush to immutable sorted segments with bloom filter and
//!   sparse index sidecars; segments are folded together by compaction. Also
//!   the only engine supporting [`fuzzy_get`](Db::fuzzy_get).
//!
//! ## Example
//!
//! ```rust,no_run
//! use siltkv::{Db, EngineKind, Options};
//!
//! let mut db = Db::open(Options::new(EngineKind::Lsm, "data_dir")).unwrap();
//! db.put(b"hello".to_vec(), b"world".to_vec()).unwrap();
//! assert_eq!(db.get(b"hello").unwrap(), Some(b"world".to_vec()));
//! db.delete(b"hello".to_vec()).unwrap();
//! db.close().unwrap();
//! ```

mod btree_engine;

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub use btree_engine::BTreeEngine;
pub use lsm::{LsmConfig, LsmTree};

/// The capability set both engines satisfy. `fuzzy_get` is deliberately not
/// part of it — only the LSM engine can serve it, and [`Db::fuzzy_get`]
/// rejects the others with [`FuzzyUnsupported`].
pub trait StorageEngine {
    /// Stores a key-value pair.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Retrieves a live value by key. Deleted and never-written keys are
    /// both `Ok(None)`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Deletes a key.
    fn delete(&mut self, key: Vec<u8>) -> Result<()>;

    /// Flushes in-memory state so a reopen recovers without the WAL.
    fn close(&mut self) -> Result<()>;
}

/// Rejection of an operation the selected engine cannot serve.
#[derive(Debug, Error)]
#[error("fuzzy_get is not supported by the {engine} engine")]
pub struct FuzzyUnsupported {
    /// Tag of the engine that rejected the operation.
    pub engine: &'static str,
}

/// Which storage backend a [`Db`] runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Durable in-memory B-Tree (WAL + snapshot).
    BTree,
    /// Log-structured merge-tree with on-disk segments.
    Lsm,
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "btree" => Ok(EngineKind::BTree),
            "lsmtree" => Ok(EngineKind::Lsm),
            other => bail!(
                "unknown engine type {:?} (expected \"btree\" or \"lsmtree\")",
                other
            ),
        }
    }
}

/// Construction-time configuration for [`Db::open`].
///
/// The LSM-only knobs (`memtable_threshold`, `bloom_false_positive_rate`,
/// `sparse_index_stride`, `compaction_trigger`) are ignored by the B-Tree
/// engine.
#[derive(Debug, Clone)]
pub struct Options {
    /// Which backend to run.
    pub engine_type: EngineKind,
    /// Directory the engine owns exclusively while open.
    pub directory: PathBuf,
    /// LSM: memtable entry count that triggers a flush.
    pub memtable_threshold: usize,
    /// Minimum degree of the B-Tree (both engines).
    pub btree_min_degree: usize,
    /// LSM: bloom filter target false positive rate.
    pub bloom_false_positive_rate: f64,
    /// LSM: sparse index sampling stride.
    pub sparse_index_stride: usize,
    /// Fsync the WAL on every mutation.
    pub wal_sync: bool,
    /// LSM: segment count that triggers auto-compaction (0 disables).
    pub compaction_trigger: usize,
}

impl Options {
    /// Options for the given engine and directory, everything else default.
    pub fn new<P: Into<PathBuf>>(engine_type: EngineKind, directory: P) -> Self {
        Self {
            engine_type,
            directory: directory.into(),
            ..Self::default()
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            engine_type: EngineKind::BTree,
            directory: PathBuf::from("data_dir"),
            memtable_threshold: lsm::DEFAULT_MEMTABLE_THRESHOLD,
            btree_min_degree: lsm::DEFAULT_BTREE_MIN_DEGREE,
            bloom_false_positive_rate: lsm::DEFAULT_BLOOM_FPR,
            sparse_index_stride: lsm::DEFAULT_SPARSE_INDEX_STRIDE,
            wal_sync: true,
            compaction_trigger: lsm::DEFAULT_COMPACTION_TRIGGER,
        }
    }
}

enum Backend {
    BTree(BTreeEngine),
    Lsm(LsmTree),
}

/// A database handle dispatching to the engine selected at open time.
pub struct Db {
    backend: Backend,
}

impl Db {
    /// Opens (or creates) a database in `options.directory` with the
    /// selected engine, running that engine's recovery.
    pub fn open(options: Options) -> Result<Self> {
        let backend = match options.engine_type {
            EngineKind::BTree => Backend::BTree(BTreeEngine::open(
                &options.directory,
                options.btree_min_degree,
                options.wal_sync,
            )?),
            EngineKind::Lsm => {
                let config = LsmConfig {
                    memtable_threshold: options.memtable_threshold,
                    btree_min_degree: options.btree_min_degree,
                    bloom_false_positive_rate: options.bloom_false_positive_rate,
                    sparse_index_stride: options.sparse_index_stride,
                    wal_sync: options.wal_sync,
                    compaction_trigger: options.compaction_trigger,
                };
                Backend::Lsm(LsmTree::open_with(&options.directory, config)?)
            }
        };
        Ok(Self { backend })
    }

    /// Stores a key-value pair.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.engine_mut().put(key, value)
    }

    /// Retrieves a live value by key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.engine().get(key)
    }

    /// Deletes a key.
    pub fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        self.engine_mut().delete(key)
    }

    /// Finds live keys within `max_distance` edits of `search_key`.
    ///
    /// Only the LSM engine supports this; on the B-Tree engine the call
    /// fails with [`FuzzyUnsupported`].
    pub fn fuzzy_get(
        &self,
        search_key: &[u8],
        max_distance: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        match &self.backend {
            Backend::Lsm(tree) => tree.fuzzy_get(search_key, max_distance),
            Backend::BTree(_) => Err(FuzzyUnsupported { engine: "btree" }.into()),
        }
    }

    /// Closes the database, flushing in-memory state.
    pub fn close(&mut self) -> Result<()> {
        self.engine_mut().close()
    }

    fn engine(&self) -> &dyn StorageEngine {
        match &self.backend {
            Backend::BTree(e) => e,
            Backend::Lsm(e) => e,
        }
    }

    fn engine_mut(&mut self) -> &mut dyn StorageEngine {
        match &mut self.backend {
            Backend::BTree(e) => e,
            Backend::Lsm(e) => e,
        }
    }
}

impl StorageEngine for LsmTree {
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        LsmTree::put(self, key, value)
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        LsmTree::get(self, key)
    }

    fn delete(&mut self, key: Vec<u8>) -> Result<()> {
        LsmTree::delete(self, key)
    }

    fn close(&mut self) -> Result<()> {
        LsmTree::close(self)
    }
}
