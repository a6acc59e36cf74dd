//! K-way merge over segment scans.
//!
//! Produces `(key, entry)` pairs in ascending key order. When the same key
//! appears in multiple segments, only the entry from the **newest** segment
//! is emitted; the shadowed duplicates are consumed and discarded.
//!
//! This is the core primitive of compaction: walk N input segments in sorted
//! order, deduplicate by recency, and stream the survivors into a single new
//! segment. Tombstones are emitted like any other entry — whether to keep
//! them is the caller's policy decision.

use anyhow::Result;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::format::Entry;
use crate::reader::SegmentIter;

/// One pending record from one source, ordered for the merge heap.
///
/// `BinaryHeap` is a max-heap, so the comparison is reversed to surface the
/// *smallest* key first. Ties on the key are resolved by the source index:
/// sources are ordered oldest to newest, and the **higher** index (newer
/// segment) must pop first so its record shadows the rest.
struct HeapEntry {
    key: Vec<u8>,
    entry: Entry,
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .key
            .cmp(&self.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Merges the scans of multiple segments into one deduplicated sorted
/// stream.
///
/// The sources must be ordered **oldest to newest**; recency decides which
/// entry survives for a key that appears more than once. The merge is lazy —
/// each source is advanced one record at a time, so memory stays bounded by
/// the source count, not the data volume.
pub struct MergeIterator {
    sources: Vec<SegmentIter>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    /// Creates a merge over the given scans (oldest first), priming the heap
    /// with the head record of each.
    pub fn new(mut sources: Vec<SegmentIter>) -> Result<Self> {
        let mut heap = BinaryHeap::new();
        for (i, source) in sources.iter_mut().enumerate() {
            if let Some(head) = source.next() {
                let (key, entry) = head?;
                heap.push(HeapEntry {
                    key,
                    entry,
                    source: i,
                });
            }
        }
        Ok(Self { sources, heap })
    }

    /// Returns the next `(key, entry)` in ascending key order, or `None`
    /// when every source is exhausted.
    ///
    /// All heap entries sharing the returned key are drained; the tie-break
    /// guarantees the first popped one came from the newest segment.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Entry)>> {
        let top = match self.heap.pop() {
            Some(e) => e,
            None => return Ok(None),
        };
        self.advance(top.source)?;

        while let Some(peek) = self.heap.peek() {
            if peek.key != top.key {
                break;
            }
            let shadowed = self.heap.pop().expect("peeked entry is present");
            self.advance(shadowed.source)?;
        }

        Ok(Some((top.key, top.entry)))
    }

    /// Pushes the next record of `source` onto the heap, if any.
    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(next) = self.sources[source].next() {
            let (key, entry) = next?;
            self.heap.push(HeapEntry { key, entry, source });
        }
        Ok(())
    }
}
