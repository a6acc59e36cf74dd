
use crate::{write_segment, Entry, Segment};
use std::path::Path;

/// Writes a segment from `(key, value-or-tombstone)` pairs and reopens it.
pub fn build_segment(
    dir: &Path,
    generation: u64,
    pairs: &[(&str, Option<&str>)],
    stride: usize,
) -> Segment {
    let entries = pairs.iter().map(|(k, v)| {
        let entry = match v {
            Some(v) => Entry::Value(v.as_bytes().to_vec()),
            None => Entry::Tombstone,
        };
        (k.as_bytes().to_vec(), entry)
    });
    write_segment(dir, generation, entries, pairs.len(), 0.01, stride).unwrap();
    Segment::open(dir, generation).unwrap()
}
