use crate::tests::{count_data_files, small_config};
use crate::{LsmTree, WAL_FILENAME};
use anyhow::Result;
use std::fs;
use tempfile::tempdir;

#[test]
fn unflushed_writes_recover_from_wal() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
        tree.put(b"a".to_vec(), b"1".to_vec())?;
        tree.put(b"b".to_vec(), b"2".to_vec())?;
        // Simulate a crash: no close, and keep Drop from flushing.
        std::mem::forget(tree);
    }
    assert_eq!(count_data_files(dir.path()), 0, "nothing was flushed");

    let tree = LsmTree::open_with(dir.path(), small_config(100))?;
    assert_eq!(tree.memtable_len(), 2, "WAL replayed into the memtable");
    assert_eq!(tree.get(b"a")?, Some(b"1".to_vec()));
    assert_eq!(tree.get(b"b")?, Some(b"2".to_vec()));
    Ok(())
}

#[test]
fn deletes_recover_from_wal() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
        tree.put(b"k".to_vec(), b"v".to_vec())?;
        tree.flush()?;
        tree.delete(b"k".to_vec())?;
        std::mem::forget(tree);
    }

    let tree = LsmTree::open_with(dir.path(), small_config(100))?;
    assert_eq!(tree.get(b"k")?, None, "replayed tombstone hides the segment");
    Ok(())
}

#[test]
fn segments_reload_in_generation_order() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
        tree.put(b"k".to_vec(), b"old".to_vec())?;
        tree.flush()?;
        tree.put(b"k".to_vec(), b"new".to_vec())?;
        tree.flush()?;
    }

    let tree = LsmTree::open_with(dir.path(), small_config(100))?;
    assert_eq!(tree.segment_count(), 2);
    assert_eq!(tree.get(b"k")?, Some(b"new".to_vec()), "recency preserved");
    Ok(())
}

#[test]
fn generation_counter_resumes_past_existing_segments() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
        tree.put(b"a".to_vec(), b"1".to_vec())?;
        tree.flush()?; // generation 0
        tree.put(b"b".to_vec(), b"2".to_vec())?;
        tree.flush()?; // generation 1
    }

    let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
    tree.put(b"c".to_vec(), b"3".to_vec())?;
    tree.flush()?; // must be generation 2, not 0

    let segments = crate::recovery::load_segments(dir.path())?;
    let generations: Vec<u64> = segments.iter().map(|s| s.generation()).collect();
    assert_eq!(generations, vec![0, 1, 2]);
    Ok(())
}

#[test]
fn leftover_tmp_files_are_cleaned_up() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
        tree.put(b"k".to_vec(), b"v".to_vec())?;
        tree.flush()?;
    }

    // Fake an interrupted flush.
    fs::write(dir.path().join("segment-0000000009.data.tmp"), b"junk")?;
    fs::write(dir.path().join("segment-0000000009.index.tmp"), b"junk")?;

    let tree = LsmTree::open_with(dir.path(), small_config(100))?;
    assert_eq!(tree.segment_count(), 1, "tmp files are not segments");
    let leftovers = fs::read_dir(dir.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0, "tmp files removed on open");
    Ok(())
}

#[test]
fn corrupt_wal_fails_open() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
        tree.put(b"k".to_vec(), b"v".to_vec())?;
        std::mem::forget(tree);
    }

    // Flip a bit in the record body (past the 8-byte frame header).
    let wal_path = dir.path().join(WAL_FILENAME);
    let mut bytes = fs::read(&wal_path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&wal_path, &bytes)?;

    let err = LsmTree::open_with(dir.path(), small_config(100)).unwrap_err();
    assert!(
        err.to_string().contains("replay"),
        "unexpected error: {err:#}"
    );
    Ok(())
}

#[test]
fn truncated_wal_tail_recovers_the_prefix() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
        tree.put(b"a".to_vec(), b"1".to_vec())?;
        tree.put(b"b".to_vec(), b"a-longer-value-to-chop".to_vec())?;
        std::mem::forget(tree);
    }

    // Crash mid-append: the final record loses its tail.
    let wal_path = dir.path().join(WAL_FILENAME);
    let bytes = fs::read(&wal_path)?;
    fs::write(&wal_path, &bytes[..bytes.len() - 6])?;

    let tree = LsmTree::open_with(dir.path(), small_config(100))?;
    assert_eq!(tree.get(b"a")?, Some(b"1".to_vec()));
    assert_eq!(tree.get(b"b")?, None, "torn record is dropped");
    Ok(())
}

#[test]
fn missing_sidecar_refuses_to_open() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;
        tree.put(b"k".to_vec(), b"v".to_vec())?;
        tree.flush()?;
    }

    fs::remove_file(dir.path().join("segment-0000000000.bloom"))?;
    assert!(
        LsmTree::open_with(dir.path(), small_config(100)).is_err(),
        "a segment with a missing sidecar must not be silently skipped"
    );
    Ok(())
}
