use anyhow::{bail, Context, Result};
use bloom::BloomFilter;
use byteorder::{BigEndian, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::format::{self, Entry};

/// Writes a complete segment (data file + sparse index + bloom filter) from
/// a strictly-ascending iterator of records.
///
/// # Arguments
///
/// * `dir` — segment directory.
/// * `generation` — generation number embedded in the file stems.
/// * `entries` — `(key, entry)` pairs in strictly ascending key order;
///   tombstones are written like any other record.
/// * `expected_entries` — sizing hint for the bloom filter (an upper bound
///   is fine; the filter only gets sparser).
/// * `false_positive_rate` — bloom filter target rate.
/// * `stride` — every `stride`-th record (starting with the first) is
///   sampled into the sparse index.
///
/// Returns the number of records written.
///
/// # Durability
///
/// All three files are written to `.tmp` paths and fsynced, then renamed
/// into place with the data file **last** — a segment is observable iff its
/// data file exists, so a crash at any point leaves either no segment or a
/// complete one.
///
/// # Errors
///
/// Fails on I/O errors and on unsorted input (an invariant violation, never
/// written out).
pub fn write_segment<I>(
    dir: &Path,
    generation: u64,
    entries: I,
    expected_entries: usize,
    false_positive_rate: f64,
    stride: usize,
) -> Result<u64>
where
    I: IntoIterator<Item = (Vec<u8>, Entry)>,
{
    assert!(stride >= 1, "sparse index stride must be at least 1");

    let data_path = format::data_path(dir, generation);
    let index_path = format::index_path(dir, generation);
    let bloom_path = format::bloom_path(dir, generation);
    let data_tmp = tmp_path(&data_path);
    let index_tmp = tmp_path(&index_path);
    let bloom_tmp = tmp_path(&bloom_path);

    let mut bloom = BloomFilter::new(expected_entries.max(1), false_positive_rate);
    let mut index: Vec<(Vec<u8>, u64)> = Vec::new();

    // Data file: stream records through a buffered writer, tracking offsets
    // by encoded size (the BufWriter position is not the file position).
    let mut count = 0u64;
    {
        let file = create_truncated(&data_tmp)?;
        let mut w = BufWriter::new(file);
        let mut offset = 0u64;
        let mut last_key: Option<Vec<u8>> = None;

        for (key, entry) in entries {
            if let Some(prev) = &last_key {
                if key.as_slice() <= prev.as_slice() {
                    bail!(
                        "segment input not strictly ascending: {:?} after {:?}",
                        String::from_utf8_lossy(&key),
                        String::from_utf8_lossy(prev)
                    );
                }
            }

            if count % stride as u64 == 0 {
                index.push((key.clone(), offset));
            }
            bloom.insert(&key);

            format::write_record(&mut w, &key, &entry)
                .with_context(|| format!("failed writing record to {}", data_tmp.display()))?;
            offset += format::encoded_len(&key, &entry);
            count += 1;
            last_key = Some(key);
        }

        w.flush()?;
        w.get_ref().sync_all()?;
    }

    // Sparse index sidecar.
    {
        let file = create_truncated(&index_tmp)?;
        let mut w = BufWriter::new(file);
        w.write_u32::<BigEndian>(format::INDEX_MAGIC)?;
        w.write_u32::<BigEndian>(stride as u32)?;
        w.write_u64::<BigEndian>(count)?;
        for (key, offset) in &index {
            w.write_u32::<BigEndian>(key.len() as u32)?;
            w.write_all(key)?;
            w.write_u64::<BigEndian>(*offset)?;
        }
        w.flush()?;
        w.get_ref().sync_all()?;
    }

    // Bloom filter sidecar.
    {
        let file = create_truncated(&bloom_tmp)?;
        let mut w = BufWriter::new(file);
        bloom
            .write_to(&mut w)
            .with_context(|| format!("failed writing bloom sidecar {}", bloom_tmp.display()))?;
        w.flush()?;
        w.get_ref().sync_all()?;
    }

    // Commit: sidecars first, data file last.
    fs::rename(&index_tmp, &index_path)
        .with_context(|| format!("failed to commit {}", index_path.display()))?;
    fs::rename(&bloom_tmp, &bloom_path)
        .with_context(|| format!("failed to commit {}", bloom_path.display()))?;
    fs::rename(&data_tmp, &data_path)
        .with_context(|| format!("failed to commit {}", data_path.display()))?;

    Ok(count)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .expect("segment paths always have a file name")
        .to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn create_truncated(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("failed to create {}", path.display()))
}
