//! Cold-start path: WAL replay, segment discovery, tmp file cleanup.

use anyhow::{Context, Result};
use btree::BTree;
use sstable::{parse_generation, Entry, Segment};
use std::path::Path;
use tracing::{debug, warn};
use wal::{WalReader, WalRecord};

/// Replays a WAL file into the given memtable, returning the number of
/// records applied. An absent WAL file is a fresh start, not an error.
pub(crate) fn replay_wal(path: &Path, memtable: &mut BTree<Entry>) -> Result<u64> {
    let mut reader = match WalReader::open(path) {
        Ok(reader) => reader,
        Err(wal::WalError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no WAL to replay");
            return Ok(0);
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to open WAL {} for replay", path.display())))
        }
    };

    let mut applied = 0u64;
    reader
        .replay(|record| {
            match record {
                WalRecord::Put { key, value } => memtable.insert(key, Entry::Value(value)),
                WalRecord::Del { key } => memtable.insert(key, Entry::Tombstone),
            }
            applied += 1;
        })
        .with_context(|| format!("failed to replay WAL {}", path.display()))?;

    Ok(applied)
}

/// Discovers committed segments by their data files and opens each one.
/// Returns them ordered oldest to newest (ascending generation).
pub(crate) fn load_segments(dir: &Path) -> Result<Vec<Segment>> {
    let mut generations: Vec<u64> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(parse_generation)
        })
        .collect();
    generations.sort_unstable();

    let mut segments = Vec::with_capacity(generations.len());
    for generation in generations {
        let segment = Segment::open(dir, generation)
            .with_context(|| format!("failed to open segment generation {}", generation))?;
        debug!(generation, entries = segment.len(), "loaded segment");
        segments.push(segment);
    }
    Ok(segments)
}

/// Removes leftover `.tmp` files from interrupted flushes or compactions.
/// Best-effort: a file that cannot be removed is logged and skipped.
pub(crate) fn cleanup_tmp_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_tmp = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".tmp"));
        if is_tmp {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove tmp file");
            }
        }
    }
}
