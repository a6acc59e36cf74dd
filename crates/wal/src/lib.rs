//! # WAL — Write-Ahead Log
//!
//! Crash-safe durability for both siltkv engines.
//!
//! Every mutation (`PUT` or `DELETE`) is appended here **before** the
//! corresponding in-memory update, so a crash can lose nothing that was
//! acknowledged. On restart the log is replayed front to back; a later
//! record simply shadows an earlier one. That is also why records carry no
//! sequence numbers: a record's position in the log *is* its age, and the
//! log is the only ordering authority.
//!
//! ## Wire format
//!
//! Each record is framed independently:
//!
//! ```text
//! [record_len: u32 BE][crc32: u32 BE][body]
//! ```
//!
//! `record_len` counts the CRC plus the body. The body is the record's own
//! encoding (see [`WalRecord`]):
//!
//! ```text
//! Put: [op=0: u8][key_len: u32 BE][key][val_len: u32 BE][value]
//! Del: [op=1: u8][key_len: u32 BE][key]
//! ```
//!
//! ## What replay forgives
//!
//! Exactly one thing: an incomplete frame at the very end of the file, the
//! signature of a crash mid-append. Those bytes are dropped and every frame
//! before them is replayed. Anything else that fails validation — a CRC
//! mismatch, an op tag that is neither PUT nor DELETE, a length field that
//! overruns its frame — means the log can no longer be trusted, and replay
//! stops with [`WalError::Corrupt`] naming the check that failed.

use byteorder::{BigEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Ceiling on a single frame. The engines cap keys at 64 KiB and values at
/// 10 MiB, so a legal frame is always well under this; a length field above
/// it can only be garbage.
const MAX_RECORD_BYTES: u32 = 16 * 1024 * 1024;

/// Frame header size: `record_len` plus the CRC.
const HEADER_BYTES: usize = 8;

/// A single logged mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion.
    Put {
        /// The lookup key.
        key: Vec<u8>,
        /// The payload value.
        value: Vec<u8>,
    },
    /// A key deletion (tombstone).
    Del {
        /// The key to delete.
        key: Vec<u8>,
    },
}

impl WalRecord {
    /// Appends this record's body encoding to `buf`.
    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            WalRecord::Put { key, value } => {
                buf.push(0);
                buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
                buf.extend_from_slice(key);
                buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
                buf.extend_from_slice(value);
            }
            WalRecord::Del { key } => {
                buf.push(1);
                buf.extend_from_slice(&(key.len() as u32).to_be_bytes());
                buf.extend_from_slice(key);
            }
        }
    }

    /// Size of the body encoding, for frame preallocation.
    fn encoded_len(&self) -> usize {
        match self {
            WalRecord::Put { key, value } => 1 + 4 + key.len() + 4 + value.len(),
            WalRecord::Del { key } => 1 + 4 + key.len(),
        }
    }

    /// Parses a record from a CRC-validated frame body.
    fn decode(mut body: &[u8]) -> Result<Self, WalError> {
        let op = body
            .read_u8()
            .map_err(|_| WalError::Corrupt("record body is empty"))?;
        let key = take_len_prefixed(&mut body)?;
        match op {
            0 => {
                let value = take_len_prefixed(&mut body)?;
                Ok(WalRecord::Put { key, value })
            }
            1 => Ok(WalRecord::Del { key }),
            _ => Err(WalError::Corrupt("unknown op tag")),
        }
    }
}

/// Splits a `[len: u32 BE][bytes]` field off the front of `body`.
fn take_len_prefixed(body: &mut &[u8]) -> Result<Vec<u8>, WalError> {
    let len = body
        .read_u32::<BigEndian>()
        .map_err(|_| WalError::Corrupt("record body ends inside a length prefix"))? as usize;
    if len > body.len() {
        return Err(WalError::Corrupt("length prefix overruns the record"));
    }
    let (bytes, rest) = body.split_at(len);
    *body = rest;
    Ok(bytes.to_vec())
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A frame or record failed validation; the message names the check.
    #[error("corrupt wal record: {0}")]
    Corrupt(&'static str),
}

/// Append-only WAL writer.
///
/// Each [`append`](Self::append) assembles the complete frame in memory and
/// hands it to the OS as a single `write_all`, so a crash can tear at most
/// the final frame — exactly the case replay forgives. With `sync` on, the
/// call does not return until `sync_all()` (fsync) has made the frame
/// durable.
pub struct WalWriter {
    file: File,
    sync: bool,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    ///
    /// # Arguments
    ///
    /// * `path` - filesystem path for the WAL (created if it does not exist).
    /// * `sync` - if `true`, every `append` call is followed by fsync.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file, sync })
    }

    /// Appends one record as a framed, checksummed entry.
    pub fn append(&mut self, record: &WalRecord) -> Result<(), WalError> {
        let body_len = record.encoded_len();
        let record_len = body_len + 4;
        if record_len > MAX_RECORD_BYTES as usize {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "record exceeds the frame size ceiling",
            )));
        }

        let mut body = Vec::with_capacity(body_len);
        record.encode_into(&mut body);

        let mut hasher = Crc32::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(HEADER_BYTES + body.len());
        frame.extend_from_slice(&(record_len as u32).to_be_bytes());
        frame.extend_from_slice(&crc.to_be_bytes());
        frame.append(&mut body);

        self.file.write_all(&frame)?;
        if self.sync {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Forces everything written so far down to disk via `sync_all()`.
    ///
    /// This is the durability point for callers running with `sync` off:
    /// nothing is stable until it returns.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Sequential WAL reader.
///
/// Generic over any `Read` implementor so tests can replay from in-memory
/// buffers.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every record in log order, calling `apply` on each.
    ///
    /// Stops cleanly at end of file or at a torn final frame; stops with an
    /// error on I/O failure or corruption anywhere else.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        while let Some(body) = self.next_frame()? {
            apply(WalRecord::decode(&body)?);
        }
        Ok(())
    }

    /// Reads the next CRC-validated frame body.
    ///
    /// Returns `Ok(None)` both at a clean end of file and at a torn final
    /// frame (header or body cut short mid-append) — the two are
    /// indistinguishable on disk and equally harmless.
    fn next_frame(&mut self) -> Result<Option<Vec<u8>>, WalError> {
        let mut header = [0u8; HEADER_BYTES];
        match self.rdr.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        }

        let record_len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let crc = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        if record_len <= 4 || record_len > MAX_RECORD_BYTES {
            return Err(WalError::Corrupt("record length out of range"));
        }

        let mut body = vec![0u8; (record_len - 4) as usize];
        match self.rdr.read_exact(&mut body) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(WalError::Io(e)),
        }

        let mut hasher = Crc32::new();
        hasher.update(&body);
        if hasher.finalize() != crc {
            return Err(WalError::Corrupt("crc mismatch"));
        }

        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests;
