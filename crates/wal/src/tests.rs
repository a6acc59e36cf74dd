use super::*;
use std::fs;
use std::io::Cursor;
use tempfile::tempdir;

// -------------------- Helpers --------------------

fn put(key: &[u8], value: &[u8]) -> WalRecord {
    WalRecord::Put {
        key: key.to_vec(),
        value: value.to_vec(),
    }
}

fn del(key: &[u8]) -> WalRecord {
    WalRecord::Del { key: key.to_vec() }
}

fn replay_all(path: &std::path::Path) -> Result<Vec<WalRecord>, WalError> {
    let mut reader = WalReader::open(path)?;
    let mut recs = Vec::new();
    reader.replay(|r| recs.push(r))?;
    Ok(recs)
}

fn replay_from_bytes(data: &[u8]) -> Result<Vec<WalRecord>, WalError> {
    let mut reader = WalReader::from_reader(Cursor::new(data.to_vec()));
    let mut recs = Vec::new();
    reader.replay(|r| recs.push(r))?;
    Ok(recs)
}

/// Builds a frame around `body` with a correct CRC, so tests can exercise
/// body-level validation in isolation.
fn frame_with_valid_crc(body: &[u8]) -> Vec<u8> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(body);
    let crc = hasher.finalize();

    let mut frame = Vec::new();
    frame.extend_from_slice(&((body.len() as u32 + 4).to_be_bytes()));
    frame.extend_from_slice(&crc.to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

// -------------------- Basic write & replay --------------------

#[test]
fn write_and_replay_put_and_del() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&put(b"k", b"v1")).unwrap();
        w.append(&put(b"k2", b"v2")).unwrap();
        w.append(&del(b"k")).unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs, vec![put(b"k", b"v1"), put(b"k2", b"v2"), del(b"k")]);
}

#[test]
fn replay_preserves_log_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = WalWriter::create(&path, false).unwrap();
        for i in 0..100u32 {
            w.append(&put(format!("k{}", i).as_bytes(), b"v")).unwrap();
        }
        w.sync_to_disk().unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs.len(), 100);
    for (i, rec) in recs.iter().enumerate() {
        assert_eq!(rec, &put(format!("k{}", i).as_bytes(), b"v"));
    }
}

#[test]
fn empty_value_and_empty_key_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&put(b"k", b"")).unwrap();
        w.append(&put(b"", b"v")).unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs, vec![put(b"k", b""), put(b"", b"v")]);
}

#[test]
fn append_after_reopen_extends_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&put(b"a", b"1")).unwrap();
    }
    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&put(b"b", b"2")).unwrap();
    }

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs, vec![put(b"a", b"1"), put(b"b", b"2")]);
}

// -------------------- Truncated tail tolerance --------------------

#[test]
fn truncated_tail_after_valid_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&put(b"k1", b"v1")).unwrap();
        w.append(&put(b"k2", b"v2")).unwrap();
    }

    // Append half a header: a crash after 4 bytes of a new frame.
    let mut data = fs::read(&path).unwrap();
    data.extend_from_slice(&32u32.to_be_bytes());
    fs::write(&path, &data).unwrap();

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs, vec![put(b"k1", b"v1"), put(b"k2", b"v2")]);
}

#[test]
fn truncated_body_is_tolerated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&put(b"k1", b"v1")).unwrap();
        w.append(&put(b"k2", b"a-much-longer-value")).unwrap();
    }

    // Chop the last record's body in half.
    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..data.len() - 8]).unwrap();

    let recs = replay_all(&path).unwrap();
    assert_eq!(recs, vec![put(b"k1", b"v1")]);
}

#[test]
fn replay_empty_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");
    fs::write(&path, b"").unwrap();

    let recs = replay_all(&path).unwrap();
    assert!(recs.is_empty());
}

// -------------------- Corruption detection --------------------

#[test]
fn crc_mismatch_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal.log");

    {
        let mut w = WalWriter::create(&path, true).unwrap();
        w.append(&put(b"key", b"value")).unwrap();
    }

    // Flip a bit in the body (after the 8-byte frame header).
    let mut data = fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xff;

    let err = replay_from_bytes(&data).unwrap_err();
    assert!(matches!(err, WalError::Corrupt(_)));
}

#[test]
fn unknown_op_tag_is_corrupt() {
    // A CRC-valid frame whose body claims op tag 9.
    let body = {
        let mut b = Vec::new();
        b.push(9u8);
        b.extend_from_slice(&1u32.to_be_bytes());
        b.push(b'k');
        b
    };
    let frame = frame_with_valid_crc(&body);

    let err = replay_from_bytes(&frame).unwrap_err();
    assert!(matches!(err, WalError::Corrupt(_)));
}

#[test]
fn length_prefix_overrunning_the_record_is_corrupt() {
    // A CRC-valid PUT whose key_len promises more bytes than the body holds.
    let body = {
        let mut b = Vec::new();
        b.push(0u8);
        b.extend_from_slice(&100u32.to_be_bytes());
        b.extend_from_slice(b"shortkey");
        b
    };
    let frame = frame_with_valid_crc(&body);

    let err = replay_from_bytes(&frame).unwrap_err();
    assert!(matches!(err, WalError::Corrupt(_)));
}

#[test]
fn absurd_record_len_is_corrupt() {
    let mut frame = Vec::new();
    frame.extend_from_slice(&u32::MAX.to_be_bytes());
    frame.extend_from_slice(&[0u8; 64]);

    let err = replay_from_bytes(&frame).unwrap_err();
    assert!(matches!(err, WalError::Corrupt(_)));
}

#[test]
fn zero_record_len_is_corrupt() {
    // A complete header whose record_len cannot even cover its own CRC.
    let mut frame = Vec::new();
    frame.extend_from_slice(&0u32.to_be_bytes());
    frame.extend_from_slice(&0u32.to_be_bytes());

    let err = replay_from_bytes(&frame).unwrap_err();
    assert!(matches!(err, WalError::Corrupt(_)));
}
