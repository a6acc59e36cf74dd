//! Compaction: merges every committed segment into a single new one.
//!
//! Uses [`MergeIterator`] for sorted, recency-deduplicated streaming from
//! all inputs. Tombstones are eliminated entirely — a full compaction leaves
//! no older segment whose records they could still be shadowing. The result
//! is committed atomically (tmp + rename inside the segment writer), the
//! segment list is swapped, and the input files are deleted.

use anyhow::Result;
use sstable::{remove_segment_files, write_segment, Entry, MergeIterator, Segment};
use tracing::info;

use crate::LsmTree;

impl LsmTree {
    /// Merges all segments into one, dropping shadowed records and
    /// tombstones. No-op with fewer than two segments.
    ///
    /// The output segment receives a generation newer than every input, so
    /// recovery order stays correct. If every surviving record was a
    /// tombstone, no output segment is created at all — the inputs are
    /// simply deleted.
    ///
    /// # When it runs
    ///
    /// Automatically after a flush once the segment count reaches
    /// `compaction_trigger`, or manually at any time.
    pub fn compact(&mut self) -> Result<()> {
        if self.segments.len() < 2 {
            return Ok(());
        }

        let generation = self.next_generation;
        let input_count = self.segments.len();
        info!(inputs = input_count, generation, "starting compaction");

        let scans = self
            .segments
            .iter()
            .map(|s| s.iter())
            .collect::<Result<Vec<_>>>()?;
        let mut merge = MergeIterator::new(scans)?;

        // Bloom sizing: the input total is an upper bound on the output
        // (deduplication and tombstone elimination only shrink it).
        let estimated: u64 = self.segments.iter().map(|s| s.len()).sum();

        // Stream survivors straight into the new segment without
        // materializing the merged data set. Memory stays bounded by the
        // bloom filter and sparse index, not the data volume. An error from
        // the merge ends the stream early and is checked afterwards.
        let mut merge_error: Option<anyhow::Error> = None;
        let survivors = std::iter::from_fn(|| loop {
            match merge.next_entry() {
                Ok(Some((_, Entry::Tombstone))) => continue,
                Ok(Some(pair)) => return Some(pair),
                Ok(None) => return None,
                Err(e) => {
                    merge_error = Some(e);
                    return None;
                }
            }
        });

        let write_result = write_segment(
            &self.dir,
            generation,
            survivors,
            estimated as usize,
            self.config.bloom_false_positive_rate,
            self.config.sparse_index_stride,
        );

        // A merge error truncated the stream: whatever the writer committed
        // is incomplete and must not survive. Inputs stay untouched.
        if let Some(e) = merge_error {
            let _ = remove_segment_files(&self.dir, generation);
            return Err(e);
        }
        let written = write_result?;
        self.next_generation += 1;

        let old_generations: Vec<u64> =
            self.segments.iter().map(|s| s.generation()).collect();

        // Drop the old readers (releases file handles) before unlinking.
        self.segments.clear();

        if written == 0 {
            // Every record merged away to tombstones; skip the empty output.
            remove_segment_files(&self.dir, generation)?;
        } else {
            self.segments.push(Segment::open(&self.dir, generation)?);
        }

        for old in &old_generations {
            remove_segment_files(&self.dir, *old)?;
        }

        info!(
            inputs = input_count,
            written,
            generation,
            "compaction complete"
        );
        Ok(())
    }
}
