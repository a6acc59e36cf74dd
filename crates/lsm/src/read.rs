//! Read path: `get()` and `fuzzy_get()`.
//!
//! Point lookups check the memtable first (freshest data, tombstones
//! included), then segments from newest to oldest, each gated by its bloom
//! filter. The first match wins.
//!
//! Fuzzy search cannot use the bloom filters or the sparse indexes — it
//! must consider every key — so it walks the memtable and then performs a
//! full lazy scan of each segment, newest first, deduplicating by the first
//! (most recent) observation of each key.

use anyhow::Result;
use sstable::Entry;
use std::collections::HashSet;

use crate::levenshtein;
use crate::LsmTree;

impl LsmTree {
    /// Looks up a key, returning its live value.
    ///
    /// Returns `Ok(None)` both for keys never written and for keys whose
    /// newest record is a tombstone.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        // 1. Memtable: freshest data; a tombstone here hides everything.
        if let Some(entry) = self.memtable.get(key) {
            return Ok(entry.clone().into_value());
        }

        // 2. Segments newest -> oldest; the first record for the key wins.
        for segment in self.segments.iter().rev() {
            if let Some(entry) = segment.get(key)? {
                return Ok(entry.into_value());
            }
        }

        Ok(None)
    }

    /// Finds live keys within `max_distance` Levenshtein edits of
    /// `search_key`, returning `(key, value)` pairs.
    ///
    /// Distance is computed over raw bytes; UTF-8 keys are matched by their
    /// byte encoding (a multi-byte character counts per byte).
    ///
    /// Recency is respected: only the newest record of each key is
    /// considered, so an overwritten value never resurfaces and a deleted
    /// key does not match at all. The result order is the order keys were
    /// first observed (memtable in key order, then each segment's scan
    /// order, newest segment first).
    pub fn fuzzy_get(&self, search_key: &[u8], max_distance: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut results: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let mut seen: HashSet<Vec<u8>> = HashSet::new();

        for (key, entry) in self.memtable.items() {
            if levenshtein::distance(search_key, key) <= max_distance {
                seen.insert(key.to_vec());
                if let Entry::Value(value) = entry {
                    results.push((key.to_vec(), value.clone()));
                }
            }
        }

        for segment in self.segments.iter().rev() {
            for record in segment.iter()? {
                let (key, entry) = record?;
                if seen.contains(&key) {
                    continue;
                }
                if levenshtein::distance(search_key, &key) <= max_distance {
                    // Mark even tombstoned keys as seen: their newest record
                    // is a delete, so older live values must not match.
                    seen.insert(key.clone());
                    if let Entry::Value(value) = entry {
                        results.push((key, value));
                    }
                }
            }
        }

        Ok(results)
    }
}
