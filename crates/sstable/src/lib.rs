//! # SSTable - Sorted String Table segments
//!
//! Immutable on-disk sorted runs for the siltkv LSM engine.
//!
//! When the in-memory memtable reaches its entry threshold the engine
//! flushes it to a **segment**: three files sharing the stem
//! `segment-<generation>`, written once and never modified (only replaced by
//! compaction).
//!
//! ## Files per segment
//!
//! ```text
//! segment-0000000007.data    sorted length-prefixed records
//! segment-0000000007.index   sparse index sidecar (every Nth key -> offset)
//! segment-0000000007.bloom   serialized bloom filter over all keys
//! ```
//!
//! ### Data file
//!
//! ```text
//! [key_len: u32 BE][key][val_len: u32 BE][value]
//! ...repeated, keys strictly ascending, no duplicates...
//! ```
//!
//! A `val_len` of `0xFFFF_FFFF` is the tombstone sentinel: the record marks
//! the key as deleted and carries no payload.
//!
//! ### Index sidecar
//!
//! ```text
//! [magic: u32 BE]["SIX1"][stride: u32 BE][entry_count: u64 BE]
//! [key_len: u32 BE][key][offset: u64 BE]   -- one per stride-th record
//! ```
//!
//! The offsets are monotone increasing and each points at the first byte of
//! an encoded record in the data file. A point lookup binary-searches the
//! index for the greatest sampled key at or below the target, seeks there,
//! and scans forward at most one stride's worth of records.
//!
//! ### Bloom sidecar
//!
//! The serialized [`bloom::BloomFilter`] built from every key in the
//! segment. It reports "possibly present" for all of them (no false
//! negatives), letting reads skip segments that cannot contain a key.
//!
//! ## Durability
//!
//! All three files are written under a `.tmp` suffix, fsynced, and renamed
//! into place — sidecars first, data file last. A segment is observable iff
//! its `.data` file exists, so a crash mid-flush never leaves a readable
//! half-segment. The generation number embedded in the stem is zero-padded;
//! sorting directory entries lexicographically recovers segment age.

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{
    bloom_path, data_path, index_path, parse_generation, read_record, remove_segment_files,
    write_record, Entry, INDEX_MAGIC, MAX_KEY_BYTES, MAX_VALUE_BYTES, TOMBSTONE_LEN,
};
pub use merge::MergeIterator;
pub use reader::{Segment, SegmentIter};
pub use writer::write_segment;

#[cfg(test)]
mod tests;
