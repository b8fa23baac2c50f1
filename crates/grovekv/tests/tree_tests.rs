//! End-to-end tests against the public API only.

use grovekv::{Config, Tree};
use std::path::Path;
use std::time::{Duration, Instant};

fn wait_for<F: FnMut() -> bool>(mut cond: F, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {what}");
}

fn count_sst_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.ends_with(".sst"))
                .unwrap_or(false)
        })
        .count()
}

#[test]
fn simple_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let tree = Tree::new(Config::new(dir.path()).build().unwrap()).unwrap();

    tree.put(b"k", b"v").unwrap();
    assert_eq!(tree.get(b"k").unwrap(), Some(b"v".to_vec()));
    assert_eq!(tree.get(b"missing").unwrap(), None);
    tree.close();
}

#[test]
fn overwrite_observes_last_write() {
    let dir = tempfile::tempdir().unwrap();
    let tree = Tree::new(Config::new(dir.path()).build().unwrap()).unwrap();

    tree.put(b"k", b"a").unwrap();
    tree.put(b"k", b"b").unwrap();
    assert_eq!(tree.get(b"k").unwrap(), Some(b"b".to_vec()));
    tree.close();
}

#[test]
fn small_segment_budget_triggers_background_flush() {
    let dir = tempfile::tempdir().unwrap();
    let conf = Config::new(dir.path()).group_sst_size(1024).build().unwrap();
    let tree = Tree::new(conf).unwrap();

    let value = vec![b'x'; 60];
    for i in 0..50 {
        tree.put(format!("key_{i:04}").as_bytes(), &value).unwrap();
    }

    wait_for(|| count_sst_files(dir.path()) >= 1, "at least one segment on disk");

    for i in 0..50 {
        assert_eq!(
            tree.get(format!("key_{i:04}").as_bytes()).unwrap(),
            Some(value.clone()),
            "key_{i:04}"
        );
    }
    tree.close();
}

#[test]
fn group_compaction_keeps_data_and_bounds_segments() {
    let dir = tempfile::tempdir().unwrap();
    let conf = Config::new(dir.path())
        .group_sst_size(1024)
        .group_size(3)
        .compaction_ratio(0.7)
        .build()
        .unwrap();
    let tree = Tree::new(conf).unwrap();

    // Four generations over the same key range; each generation exceeds
    // the rotation threshold and becomes at least one segment.
    let mut latest = std::collections::HashMap::new();
    for round in 0..4u32 {
        for i in 0..20 {
            let key = format!("key_{i:04}");
            let value = format!("round_{round}_{i:04}_{}", "y".repeat(40));
            tree.put(key.as_bytes(), value.as_bytes()).unwrap();
            latest.insert(key, value);
        }
        wait_for(
            || tree.pending_buffer_count() == 0,
            "generation flushed",
        );
    }

    // Compaction must bring every group back under its cap.
    wait_for(
        || tree.segment_count() <= 3 && tree.pending_buffer_count() == 0,
        "segments merged under the group cap",
    );

    for (key, value) in &latest {
        assert_eq!(
            tree.get(key.as_bytes()).unwrap(),
            Some(value.clone().into_bytes()),
            "{key}"
        );
    }
    tree.close();
}

#[test]
fn crash_recovery_replays_acknowledged_writes() {
    let dir = tempfile::tempdir().unwrap();

    {
        let tree = Tree::new(Config::new(dir.path()).build().unwrap()).unwrap();
        for i in 0..10 {
            tree.put(format!("key_{i}").as_bytes(), format!("value_{i}").as_bytes())
                .unwrap();
        }
        // Simulate a crash: no close, no drop.
        std::mem::forget(tree);
    }

    let tree = Tree::new(Config::new(dir.path()).build().unwrap()).unwrap();
    for i in 0..10 {
        assert_eq!(
            tree.get(format!("key_{i}").as_bytes()).unwrap(),
            Some(format!("value_{i}").into_bytes()),
            "key_{i}"
        );
    }
    tree.close();
}

#[test]
fn close_then_reopen_preserves_everything() {
    let dir = tempfile::tempdir().unwrap();

    {
        let conf = Config::new(dir.path()).group_sst_size(2048).build().unwrap();
        let tree = Tree::new(conf).unwrap();
        for i in 0..200 {
            tree.put(
                format!("key_{i:04}").as_bytes(),
                format!("value_{i:04}").as_bytes(),
            )
            .unwrap();
        }
        tree.close();
    }

    let tree = Tree::new(Config::new(dir.path()).build().unwrap()).unwrap();
    for i in 0..200 {
        assert_eq!(
            tree.get(format!("key_{i:04}").as_bytes()).unwrap(),
            Some(format!("value_{i:04}").into_bytes()),
            "key_{i:04}"
        );
    }
    tree.close();
}

#[test]
fn nonexistent_keys_miss_without_errors() {
    let dir = tempfile::tempdir().unwrap();
    let conf = Config::new(dir.path())
        .group_sst_size(64 * 1024)
        .build()
        .unwrap();
    let tree = Tree::new(conf).unwrap();

    for i in 0..10_000 {
        tree.put(format!("key_{i:08}").as_bytes(), b"present").unwrap();
    }
    for i in 0..10_000 {
        assert_eq!(
            tree.get(format!("nonexistent_{i:08}").as_bytes()).unwrap(),
            None,
            "nonexistent_{i:08}"
        );
    }
    tree.close();
}

#[test]
fn empty_value_models_a_delete() {
    let dir = tempfile::tempdir().unwrap();
    let tree = Tree::new(Config::new(dir.path()).build().unwrap()).unwrap();

    tree.put(b"k", b"live").unwrap();
    tree.put(b"k", b"").unwrap();
    assert_eq!(tree.get(b"k").unwrap(), Some(Vec::new()));
    tree.close();
}

#[test]
fn concurrent_readers_and_writers() {
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let conf = Config::new(dir.path()).group_sst_size(8192).build().unwrap();
    let tree = Arc::new(Tree::new(conf).unwrap());

    let writers: Vec<_> = (0..3)
        .map(|t| {
            let tree = Arc::clone(&tree);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("w{t}_{i:04}");
                    tree.put(key.as_bytes(), format!("val_{t}_{i}").as_bytes())
                        .unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let tree = Arc::clone(&tree);
            std::thread::spawn(move || {
                for i in 0..500 {
                    // Reads during writes may hit or miss, but never error.
                    let key = format!("w0_{i:04}");
                    tree.get(key.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    for h in writers.into_iter().chain(readers) {
        h.join().unwrap();
    }

    for t in 0..3 {
        for i in 0..500 {
            let key = format!("w{t}_{i:04}");
            assert_eq!(
                tree.get(key.as_bytes()).unwrap(),
                Some(format!("val_{t}_{i}").into_bytes()),
                "{key}"
            );
        }
    }
    tree.close();
}
