//! # Bloom Filter
//!
//! A space-efficient probabilistic set used to skip disk reads for keys that
//! are definitely absent.
//!
//! A bloom filter can say with certainty that a key is **not** in the set (no
//! false negatives) but may occasionally claim membership for a key that was
//! never inserted (false positives). The false positive rate is a function of
//! the bit-array size and the number of hash functions.
//!
//! ## Usage in siltkv
//!
//! Every on-disk segment carries a bloom filter sidecar built from its keys.
//! Point lookups consult the filter first; a negative answer skips the sparse
//! index and the data file entirely.
//!
//! ## Example
//!
//! ```rust,no_run
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.insert(b"hello");
//! assert!(bf.may_contain(b"hello"));
//! ```

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Upper bound on a deserialized bit array (128 MiB). Guards against a
/// corrupt sidecar asking for an absurd allocation.
const MAX_BITS_BYTES: usize = 128 * 1024 * 1024;

/// FNV-1a starting bases for the two independent hashes. These are part of
/// the on-disk contract: a filter reloaded from a sidecar must probe the
/// same bit positions that were set when it was built.
const FNV_BASIS_1: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_BASIS_2: u64 = 0xaf63_bd4c_8601_b7df;

/// A bloom filter backed by a packed bit vector with `k` hash functions.
///
/// The `k` bit positions for an item are derived from two FNV-1a hashes by
/// double hashing: `h(i) = h1 + i * h2 (mod num_bits)`.
pub struct BloomFilter {
    bits: Vec<u8>,
    num_bits: u64,
    num_hashes: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at the given target
    /// `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in
    /// `(0, 1)`.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = -n * ln(p) / ln(2)^2, k = (m / n) * ln(2)
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        let m = m.max(8);
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        Self::with_params(m, k)
    }

    /// Creates a filter with an exact bit-array size and hash count.
    pub fn with_params(num_bits: u64, num_hashes: u32) -> Self {
        assert!(num_bits > 0, "num_bits must be > 0");
        assert!(num_hashes > 0, "num_hashes must be > 0");
        let byte_len = num_bits.div_ceil(8) as usize;
        Self {
            bits: vec![0u8; byte_len],
            num_bits,
            num_hashes,
        }
    }

    /// Inserts an item, setting its `k` derived bit positions.
    pub fn insert(&mut self, item: &[u8]) {
        let (h1, h2) = hash_pair(item);
        for i in 0..self.num_hashes {
            let idx = self.bit_index(h1, h2, i);
            self.bits[(idx / 8) as usize] |= 1 << (idx % 8);
        }
    }

    /// Returns `true` if the item **might** be in the set, `false` if it is
    /// **definitely not**.
    #[must_use]
    pub fn may_contain(&self, item: &[u8]) -> bool {
        let (h1, h2) = hash_pair(item);
        (0..self.num_hashes).all(|i| {
            let idx = self.bit_index(h1, h2, i);
            self.bits[(idx / 8) as usize] >> (idx % 8) & 1 == 1
        })
    }

    /// Returns the size of the bit array in bits.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Serializes the filter.
    ///
    /// Wire format (big-endian):
    /// ```text
    /// [num_bits: u64][num_hashes: u32][bits_len: u32][bits: bytes]
    /// ```
    ///
    /// A filter rebuilt by [`read_from`](Self::read_from) is bit-identical.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u64::<BigEndian>(self.num_bits)?;
        w.write_u32::<BigEndian>(self.num_hashes)?;
        w.write_u32::<BigEndian>(self.bits.len() as u32)?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a filter previously written with [`write_to`](Self::write_to).
    ///
    /// Returns `InvalidData` if the declared sizes are inconsistent or exceed
    /// the safety cap.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let num_bits = r.read_u64::<BigEndian>()?;
        let num_hashes = r.read_u32::<BigEndian>()?;
        let bits_len = r.read_u32::<BigEndian>()? as usize;

        if bits_len > MAX_BITS_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter too large: {} bytes", bits_len),
            ));
        }
        if num_bits == 0 || num_hashes == 0 || bits_len as u64 != num_bits.div_ceil(8) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bloom filter parameters are inconsistent",
            ));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    /// Double hashing: `h(i) = h1 + i * h2 (mod num_bits)`.
    fn bit_index(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// Two independent 64-bit hashes: FNV-1a under two different starting bases.
fn hash_pair(item: &[u8]) -> (u64, u64) {
    (fnv1a(item, FNV_BASIS_1), fnv1a(item, FNV_BASIS_2))
}

fn fnv1a(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
