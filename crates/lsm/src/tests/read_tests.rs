use crate::tests::small_config;
use crate::LsmTree;
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn get_checks_memtable_before_segments() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;

    tree.put(b"k".to_vec(), b"old".to_vec())?;
    tree.flush()?;
    tree.put(b"k".to_vec(), b"new".to_vec())?;

    assert_eq!(tree.get(b"k")?, Some(b"new".to_vec()));
    Ok(())
}

#[test]
fn get_walks_segments_newest_first() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;

    tree.put(b"k".to_vec(), b"gen0".to_vec())?;
    tree.flush()?;
    tree.put(b"k".to_vec(), b"gen1".to_vec())?;
    tree.flush()?;
    assert_eq!(tree.segment_count(), 2);

    assert_eq!(tree.get(b"k")?, Some(b"gen1".to_vec()));
    Ok(())
}

#[test]
fn tombstone_in_memtable_hides_segment_value() -> Result<()> {
    // S3: a delete after a flush shadows the old segment record.
    let dir = tempdir()?;
    let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;

    tree.put(b"k".to_vec(), b"v".to_vec())?;
    tree.flush()?;
    tree.delete(b"k".to_vec())?;

    assert_eq!(tree.get(b"k")?, None);
    Ok(())
}

#[test]
fn tombstone_in_newer_segment_hides_older_segment() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;

    tree.put(b"k".to_vec(), b"v".to_vec())?;
    tree.flush()?;
    tree.delete(b"k".to_vec())?;
    tree.flush()?;
    assert_eq!(tree.segment_count(), 2);

    assert_eq!(tree.get(b"k")?, None);
    Ok(())
}

#[test]
fn value_written_after_delete_is_visible() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = LsmTree::open_with(dir.path(), small_config(100))?;

    tree.put(b"k".to_vec(), b"v1".to_vec())?;
    tree.delete(b"k".to_vec())?;
    tree.flush()?;
    tree.put(b"k".to_vec(), b"v2".to_vec())?;

    assert_eq!(tree.get(b"k")?, Some(b"v2".to_vec()));
    Ok(())
}

#[test]
fn reads_hit_the_right_key_among_many() -> Result<()> {
    let dir = tempdir()?;
    let mut tree = LsmTree::open_with(dir.path(), small_config(50))?;

    for i in 0..200u32 {
        tree.put(
            format!("key{:04}", i).into_bytes(),
            format!("value{}", i).into_bytes(),
        )?;
    }
    assert!(tree.segment_count() >= 4);

    for i in 0..200u32 {
        assert_eq!(
            tree.get(format!("key{:04}", i).as_bytes())?,
            Some(format!("value{}", i).into_bytes()),
            "key{:04}",
            i
        );
    }
    assert_eq!(tree.get(b"key9999")?, None);
    Ok(())
}
