use anyhow::{anyhow, bail, Context, Result};
use bloom::BloomFilter;
use byteorder::{BigEndian, ReadBytesExt};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{self, Entry, INDEX_MAGIC, MAX_KEY_BYTES};

/// An open, committed segment: the data file plus its in-memory sparse index
/// and bloom filter, loaded from the sidecars at open.
///
/// A persistent file handle is kept for point lookups, wrapped in a `Mutex`
/// so that [`get`](Segment::get) works through a shared `&self` reference.
/// Full scans ([`iter`](Segment::iter)) open their own handle so they never
/// contend with point reads.
pub struct Segment {
    generation: u64,
    data_path: PathBuf,
    data_len: u64,
    /// Sparse index: `(key, offset)` for every stride-th record, ascending.
    index: Vec<(Vec<u8>, u64)>,
    entry_count: u64,
    bloom: BloomFilter,
    file: Mutex<BufReader<File>>,
}

impl Segment {
    /// Opens the segment of `generation` inside `dir`, loading and
    /// validating both sidecars.
    ///
    /// A missing or malformed sidecar is a hard error: the segment cannot be
    /// trusted and the engine refuses to open rather than silently skipping
    /// it.
    pub fn open(dir: &Path, generation: u64) -> Result<Self> {
        let data_path = format::data_path(dir, generation);
        let file = File::open(&data_path)
            .with_context(|| format!("failed to open segment data file {}", data_path.display()))?;
        let data_len = file.metadata()?.len();

        let index = load_index(dir, generation, data_len)?;

        let bloom_path = format::bloom_path(dir, generation);
        let bloom_file = File::open(&bloom_path).with_context(|| {
            format!("missing bloom filter sidecar {}", bloom_path.display())
        })?;
        let bloom = BloomFilter::read_from(&mut BufReader::new(bloom_file))
            .with_context(|| format!("malformed bloom filter sidecar {}", bloom_path.display()))?;

        Ok(Self {
            generation,
            data_path,
            data_len,
            index: index.entries,
            entry_count: index.entry_count,
            bloom,
            file: Mutex::new(BufReader::new(file)),
        })
    }

    /// Returns this segment's generation number.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the number of records in the data file (from the sidecar).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.entry_count
    }

    /// Returns `true` if the segment holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Point lookup.
    ///
    /// Returns `Ok(None)` when the key is not in this segment and
    /// `Ok(Some(entry))` when it is — the entry may be a tombstone, which the
    /// caller interprets.
    ///
    /// The lookup is gated by the bloom filter (a negative answer costs no
    /// I/O), then binary-searches the sparse index for the greatest sampled
    /// key at or below the target and scans forward from its offset. The
    /// scan stops at the first key greater than the target or at EOF.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        if !self.bloom.may_contain(key) {
            return Ok(None);
        }
        if self.index.is_empty() {
            return Ok(None);
        }

        // Greatest indexed key <= target; file start if the target precedes
        // the first sample (only possible via a bloom false positive).
        let pos = self.index.partition_point(|(k, _)| k.as_slice() <= key);
        let start = if pos == 0 { 0 } else { self.index[pos - 1].1 };

        let mut file = self
            .file
            .lock()
            .map_err(|e| anyhow!("segment file lock poisoned: {e}"))?;
        file.seek(SeekFrom::Start(start))
            .with_context(|| format!("seek failed in {}", self.data_path.display()))?;

        while let Some((record_key, entry)) = format::read_record(&mut *file)
            .with_context(|| format!("while scanning {}", self.data_path.display()))?
        {
            match record_key.as_slice().cmp(key) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(Some(entry)),
                Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Returns a lazy iterator over every record in the data file, in key
    /// order. Each call opens a fresh handle, so iteration is restartable
    /// and does not disturb concurrent point lookups.
    pub fn iter(&self) -> Result<SegmentIter> {
        let file = File::open(&self.data_path).with_context(|| {
            format!("failed to reopen {} for scan", self.data_path.display())
        })?;
        Ok(SegmentIter {
            reader: BufReader::new(file),
            path: self.data_path.clone(),
            done: false,
        })
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("generation", &self.generation)
            .field("entries", &self.entry_count)
            .field("index_entries", &self.index.len())
            .field("data_len", &self.data_len)
            .finish()
    }
}

/// Lazy ordered scan over a segment's data file.
///
/// Yields `(key, entry)` pairs; the first decode error ends the iteration
/// after surfacing it.
pub struct SegmentIter {
    reader: BufReader<File>,
    path: PathBuf,
    done: bool,
}

impl Iterator for SegmentIter {
    type Item = Result<(Vec<u8>, Entry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match format::read_record(&mut self.reader) {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e.context(format!("while scanning {}", self.path.display()))))
            }
        }
    }
}

struct LoadedIndex {
    entries: Vec<(Vec<u8>, u64)>,
    entry_count: u64,
}

/// Reads and validates the sparse index sidecar.
fn load_index(dir: &Path, generation: u64, data_len: u64) -> Result<LoadedIndex> {
    let path = format::index_path(dir, generation);
    let file = File::open(&path)
        .with_context(|| format!("missing sparse index sidecar {}", path.display()))?;
    let mut r = BufReader::new(file);

    let magic = r
        .read_u32::<BigEndian>()
        .with_context(|| format!("failed to read index header from {}", path.display()))?;
    if magic != INDEX_MAGIC {
        bail!(
            "bad sparse index magic {:#010x} in {} (expected {:#010x})",
            magic,
            path.display(),
            INDEX_MAGIC
        );
    }
    let stride = r.read_u32::<BigEndian>()?;
    if stride == 0 {
        bail!("sparse index stride is zero in {}", path.display());
    }
    let entry_count = r.read_u64::<BigEndian>()?;

    let mut entries: Vec<(Vec<u8>, u64)> = Vec::new();
    loop {
        let key_len = match r.read_u32::<BigEndian>() {
            Ok(v) => v as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("failed to read sparse index entry"),
        };
        if key_len > MAX_KEY_BYTES {
            bail!(
                "corrupt sparse index: key_len {} exceeds maximum {}",
                key_len,
                MAX_KEY_BYTES
            );
        }
        let mut key = vec![0u8; key_len];
        r.read_exact(&mut key)
            .with_context(|| format!("sparse index truncated in {}", path.display()))?;
        let offset = r.read_u64::<BigEndian>()?;

        // An empty segment has no index entries, so every real entry must
        // point inside the data file.
        if offset >= data_len {
            bail!(
                "sparse index offset {} points past EOF ({}) in {}",
                offset,
                data_len,
                path.display()
            );
        }
        if let Some((prev_key, prev_offset)) = entries.last() {
            if key.as_slice() <= prev_key.as_slice() || offset <= *prev_offset {
                bail!("sparse index entries not monotone in {}", path.display());
            }
        }
        entries.push((key, offset));
    }

    let expected = entry_count.div_ceil(stride as u64);
    if entries.len() as u64 != expected {
        bail!(
            "sparse index of {} has {} entries, expected {} for {} records at stride {}",
            path.display(),
            entries.len(),
            expected,
            entry_count,
            stride
        );
    }

    Ok(LoadedIndex {
        entries,
        entry_count,
    })
}
