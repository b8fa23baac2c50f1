use crate::{Config, Tree};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// A tree with a tiny segment budget so rotations happen within a test.
pub fn small_tree(dir: &Path, group_sst_size: u64) -> Tree {
    let conf = Config::new(dir)
        .group_sst_size(group_sst_size)
        .build()
        .unwrap();
    Tree::new(conf).unwrap()
}

/// Polls `cond` until it holds or a 5s deadline passes. Background flushes
/// and compactions finish in milliseconds; the generous deadline only
/// matters on loaded CI machines.
pub fn wait_for<F: FnMut() -> bool>(mut cond: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {what}");
}

pub fn sst_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .filter(|n| n.ends_with(".sst"))
        .collect();
    names.sort();
    names
}

pub fn count_sst_files(dir: &Path) -> usize {
    sst_files(dir).len()
}

pub fn count_wal_files(dir: &Path) -> usize {
    fs::read_dir(dir.join("walfile"))
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.ends_with(".wal"))
                .unwrap_or(false)
        })
        .count()
}

/// Segment count per group id, parsed from `g{id}_{seq}.sst` filenames.
pub fn segments_per_group(dir: &Path) -> BTreeMap<u64, usize> {
    let mut counts = BTreeMap::new();
    for name in sst_files(dir) {
        let Some(rest) = name.strip_suffix(".sst").and_then(|n| n.strip_prefix('g')) else {
            continue;
        };
        let Some((group, _)) = rest.split_once('_') else { continue };
        if let Ok(id) = group.parse::<u64>() {
            *counts.entry(id).or_insert(0) += 1;
        }
    }
    counts
}

/// Writes exactly one rotation's worth of data: 12 pairs of 4-byte keys and
/// 32-byte values against a 512-byte segment budget, so the final put
/// freezes the buffer and leaves the active table empty.
pub fn put_rotation_batch(tree: &Tree, prefix: char, round: usize) {
    for i in 0..12 {
        let key = format!("{prefix}{i:03}");
        let value = rotation_batch_value(round, i);
        assert_eq!(value.len(), 32);
        tree.put(key.as_bytes(), &value).unwrap();
    }
}

/// The value `put_rotation_batch` wrote for this key in this round.
pub fn rotation_batch_value(round: usize, i: usize) -> Vec<u8> {
    format!("round_{round:02}_{i:03}_0123456789abcdefghi").into_bytes()
}
