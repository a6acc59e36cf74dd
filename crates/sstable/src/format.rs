//! Record codec, segment file naming, and the shared value representation.

use anyhow::{bail, Context, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

/// Reserved value-length sentinel encoding a tombstone (no payload follows).
pub const TOMBSTONE_LEN: u32 = u32::MAX;

/// Maximum key size (64 KiB). Doubles as an allocation cap when decoding.
pub const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum value size (10 MiB). Doubles as an allocation cap when decoding.
pub const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;

/// Magic identifying a sparse index sidecar ("SIX1").
pub const INDEX_MAGIC: u32 = 0x5349_5831;

/// A stored value: live bytes or a deletion marker.
///
/// The tombstone is a first-class variant rather than a reserved byte
/// string, so any byte payload is a legal live value. On disk the
/// discriminator is the [`TOMBSTONE_LEN`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A live value.
    Value(Vec<u8>),
    /// The key is deleted; shadows older records until compaction drops it.
    Tombstone,
}

impl Entry {
    /// Returns `true` for the tombstone variant.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Entry::Tombstone)
    }

    /// Converts into the live value, or `None` for a tombstone.
    #[must_use]
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Tombstone => None,
        }
    }

    /// Borrows the live value, or `None` for a tombstone.
    #[must_use]
    pub fn as_value(&self) -> Option<&[u8]> {
        match self {
            Entry::Value(v) => Some(v),
            Entry::Tombstone => None,
        }
    }
}

// ---- Segment file naming ----

fn stem(generation: u64) -> String {
    // Zero-padded so directory order equals generation order.
    format!("segment-{:010}", generation)
}

/// Path of the data file for `generation` inside `dir`.
pub fn data_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}.data", stem(generation)))
}

/// Path of the sparse index sidecar for `generation` inside `dir`.
pub fn index_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}.index", stem(generation)))
}

/// Path of the bloom filter sidecar for `generation` inside `dir`.
pub fn bloom_path(dir: &Path, generation: u64) -> PathBuf {
    dir.join(format!("{}.bloom", stem(generation)))
}

/// Extracts the generation from a data file name
/// (`segment-0000000042.data` -> `42`). Returns `None` for anything else,
/// including `.tmp` files and the sidecars.
pub fn parse_generation(file_name: &str) -> Option<u64> {
    let digits = file_name
        .strip_prefix("segment-")?
        .strip_suffix(".data")?;
    digits.parse().ok()
}

/// Removes all three files of a segment, ignoring ones already gone.
pub fn remove_segment_files(dir: &Path, generation: u64) -> io::Result<()> {
    for path in [
        data_path(dir, generation),
        index_path(dir, generation),
        bloom_path(dir, generation),
    ] {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

// ---- Record codec ----

/// Writes one length-prefixed record.
pub fn write_record<W: Write>(w: &mut W, key: &[u8], entry: &Entry) -> io::Result<()> {
    w.write_u32::<BigEndian>(key.len() as u32)?;
    w.write_all(key)?;
    match entry {
        Entry::Value(v) => {
            w.write_u32::<BigEndian>(v.len() as u32)?;
            w.write_all(v)?;
        }
        Entry::Tombstone => {
            w.write_u32::<BigEndian>(TOMBSTONE_LEN)?;
        }
    }
    Ok(())
}

/// Returns the encoded size of a record, used for offset bookkeeping.
pub fn encoded_len(key: &[u8], entry: &Entry) -> u64 {
    let value_len = match entry {
        Entry::Value(v) => v.len() as u64,
        Entry::Tombstone => 0,
    };
    4 + key.len() as u64 + 4 + value_len
}

/// Decodes one record.
///
/// Returns `Ok(None)` on a clean end of data (EOF at a record boundary).
/// EOF *inside* a record, or a length prefix beyond the configured caps, is
/// corruption and fails.
pub fn read_record<R: Read>(r: &mut R) -> Result<Option<(Vec<u8>, Entry)>> {
    let key_len = match r.read_u32::<BigEndian>() {
        Ok(v) => v as usize,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("failed to read record key length"),
    };
    if key_len > MAX_KEY_BYTES {
        bail!(
            "corrupt record: key_len {} exceeds maximum {}",
            key_len,
            MAX_KEY_BYTES
        );
    }

    let mut key = vec![0u8; key_len];
    r.read_exact(&mut key)
        .context("record truncated inside key")?;

    let val_len = r
        .read_u32::<BigEndian>()
        .context("record truncated before value length")?;

    if val_len == TOMBSTONE_LEN {
        return Ok(Some((key, Entry::Tombstone)));
    }

    let val_len = val_len as usize;
    if val_len > MAX_VALUE_BYTES {
        bail!(
            "corrupt record: val_len {} exceeds maximum {}",
            val_len,
            MAX_VALUE_BYTES
        );
    }

    let mut value = vec![0u8; val_len];
    r.read_exact(&mut value)
        .context("record truncated inside value")?;

    Ok(Some((key, Entry::Value(value))))
}
