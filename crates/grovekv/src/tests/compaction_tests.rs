use super::helpers::*;
use crate::{Config, Tree};
use anyhow::Result;
use tempfile::tempdir;

/// Builds a tree that compacts after the third segment: cap of 3 segments
/// per group, compaction at 0.7 x 3 = 2.1.
fn compacting_tree(dir: &std::path::Path) -> Tree {
    let conf = Config::new(dir)
        .group_sst_size(512)
        .group_size(3)
        .compaction_ratio(0.7)
        .build()
        .unwrap();
    Tree::new(conf).unwrap()
}

#[test]
fn saturated_group_is_merged_back_under_the_cap() -> Result<()> {
    let dir = tempdir()?;
    let tree = compacting_tree(dir.path());

    // Four generations of the same 12 keys. The third flush crosses the
    // 2.1-segment threshold and triggers a merge.
    for round in 0..4 {
        put_rotation_batch(&tree, 'a', round);
        wait_for(|| tree.pending_buffer_count() == 0, "flush");
    }

    wait_for(
        || segments_per_group(dir.path()).values().all(|&n| n <= 3),
        "group back under its segment cap",
    );

    // Every key still reads its round-3 (latest) value.
    for i in 0..12 {
        let key = format!("a{i:03}");
        assert_eq!(
            tree.get(key.as_bytes())?,
            Some(rotation_batch_value(3, i)),
            "{key}"
        );
    }
    tree.close();
    Ok(())
}

#[test]
fn compaction_deletes_replaced_segment_files() -> Result<()> {
    let dir = tempdir()?;
    let tree = compacting_tree(dir.path());

    // Two segments sit below the compaction threshold (2 < 2.1), so this
    // file set is stable.
    for round in 0..2 {
        put_rotation_batch(&tree, 'a', round);
        wait_for(|| tree.pending_buffer_count() == 0, "flush");
    }
    let before = sst_files(dir.path());
    assert_eq!(before.len(), 2);

    // The third flush crosses the threshold; the three overlapping
    // segments merge into one (432 bytes < 512 budget) and the inputs must
    // disappear from disk.
    put_rotation_batch(&tree, 'a', 2);
    wait_for(|| tree.pending_buffer_count() == 0, "flush");
    wait_for(|| count_sst_files(dir.path()) == 1, "merge down to one segment");
    let after = sst_files(dir.path());
    for name in &before {
        assert!(!after.contains(name), "replaced segment {name} still on disk");
    }

    // The on-disk file set matches the published handle set.
    assert_eq!(tree.segment_count(), count_sst_files(dir.path()));
    tree.close();
    Ok(())
}

#[test]
fn flush_deletes_the_buffers_wal() -> Result<()> {
    let dir = tempdir()?;
    let tree = compacting_tree(dir.path());

    for round in 0..3 {
        put_rotation_batch(&tree, 'a', round);
    }
    // Once every frozen buffer is flushed, only the active WAL remains.
    wait_for(|| tree.pending_buffer_count() == 0, "flushes");
    wait_for(|| count_wal_files(dir.path()) == 1, "wal cleanup");
    assert!(dir.path().join("walfile/3.wal").exists(), "active wal is the newest index");
    tree.close();
    Ok(())
}

#[test]
fn group_cap_holds_under_sustained_overwrites() -> Result<()> {
    let dir = tempdir()?;
    let tree = compacting_tree(dir.path());

    let rounds = 10;
    for round in 0..rounds {
        put_rotation_batch(&tree, 'a', round);
        wait_for(|| tree.pending_buffer_count() == 0, "flush");
    }

    wait_for(
        || segments_per_group(dir.path()).values().all(|&n| n <= 3),
        "steady state under the cap",
    );
    for i in 0..12 {
        let key = format!("a{i:03}");
        assert_eq!(
            tree.get(key.as_bytes())?,
            Some(rotation_batch_value(rounds - 1, i)),
            "{key}"
        );
    }
    tree.close();
    Ok(())
}

#[test]
fn merged_output_rolls_at_the_segment_budget() -> Result<()> {
    // Two generations with interleaved keys in one group: 24 distinct keys
    // (~876 bytes) exceed the 512-byte budget, so the merge must emit two
    // segments instead of one oversized file.
    let dir = tempdir()?;
    let conf = Config::new(dir.path())
        .group_sst_size(512)
        .group_size(4)
        .compaction_ratio(0.5) // compact at 2 segments
        .build()?;
    let tree = Tree::new(conf)?;

    put_rotation_batch(&tree, 'a', 0); // a000..a011
    wait_for(|| tree.pending_buffer_count() == 0, "first flush");
    let before = sst_files(dir.path());

    // 12 new keys interleaved among the old ones ("a000x" sorts between
    // "a000" and "a001"), so the ranges overlap and share the group.
    for i in 0..12 {
        let key = format!("a{i:03}x");
        tree.put(key.as_bytes(), &rotation_batch_value(1, i))?;
    }
    wait_for(|| tree.pending_buffer_count() == 0, "second flush");

    // The merge replaces two input segments with two rolled outputs; the
    // file names change even though the count does not.
    wait_for(
        || {
            let now = sst_files(dir.path());
            now.len() == 2 && now.iter().all(|n| !before.contains(n))
        },
        "merge into two rolled segments",
    );
    assert_eq!(tree.group_count(), 1);

    for i in 0..12 {
        assert_eq!(
            tree.get(format!("a{i:03}").as_bytes())?,
            Some(rotation_batch_value(0, i))
        );
        assert_eq!(
            tree.get(format!("a{i:03}x").as_bytes())?,
            Some(rotation_batch_value(1, i))
        );
    }
    tree.close();
    Ok(())
}
