use crate::{Config, Error};
use anyhow::Result;
use tempfile::tempdir;

#[test]
fn build_creates_storage_directories() -> Result<()> {
    let dir = tempdir()?;
    let root = dir.path().join("db");

    let conf = Config::new(&root).build()?;
    assert!(root.is_dir());
    assert!(root.join("walfile").is_dir());
    assert_eq!(conf.dir(), root.as_path());
    Ok(())
}

#[test]
fn zero_group_size_is_rejected() {
    let dir = tempdir().unwrap();
    let err = Config::new(dir.path()).group_size(0).build().unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {err:?}");
}

#[test]
fn out_of_range_compaction_ratio_is_rejected() {
    let dir = tempdir().unwrap();
    for ratio in [0.0, 1.0, 1.5, -0.3] {
        let err = Config::new(dir.path())
            .compaction_ratio(ratio)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "ratio {ratio} got {err:?}");
    }
}

#[test]
fn zero_sizes_are_rejected() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Config::new(dir.path()).group_sst_size(0).build(),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        Config::new(dir.path()).sst_data_block_size(0).build(),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        Config::new(dir.path()).max_groups(0).build(),
        Err(Error::Config(_))
    ));
}

#[test]
fn defaults_are_the_documented_ones() -> Result<()> {
    let dir = tempdir()?;
    let conf = Config::new(dir.path()).build()?;
    let debug = format!("{conf:?}");
    assert!(debug.contains("group_size: 10"));
    assert!(debug.contains("group_sst_size: 10485760"));
    assert!(debug.contains("max_groups: 100"));
    assert!(debug.contains("compaction_ratio: 0.8"));
    assert!(debug.contains("sst_data_block_size: 16384"));
    Ok(())
}

#[test]
fn alternative_memtable_constructor_is_honored() -> Result<()> {
    use crate::Tree;

    let dir = tempdir()?;
    let conf = Config::new(dir.path())
        .memtable(memtable::new_btree_table)
        .build()?;
    let tree = Tree::new(conf)?;
    tree.put(b"k", b"v")?;
    assert_eq!(tree.get(b"k")?, Some(b"v".to_vec()));
    tree.close();
    Ok(())
}
