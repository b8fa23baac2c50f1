use crate::MergeIterator;
use memtable::KV;

fn kv(k: &str, v: &str) -> KV {
    KV::new(k.as_bytes().to_vec(), v.as_bytes().to_vec())
}

#[test]
fn merges_disjoint_sources_in_order() {
    let merged: Vec<KV> = MergeIterator::new(vec![
        vec![kv("a", "1"), kv("c", "3")],
        vec![kv("b", "2"), kv("d", "4")],
    ])
    .collect();

    let keys: Vec<&[u8]> = merged.iter().map(|kv| kv.key.as_slice()).collect();
    assert_eq!(keys, vec![b"a".as_slice(), b"b", b"c", b"d"]);
}

#[test]
fn younger_source_wins_on_duplicate_keys() {
    // Sources are ordered oldest-first; the later source must shadow.
    let merged: Vec<KV> = MergeIterator::new(vec![
        vec![kv("a", "old"), kv("b", "old"), kv("c", "only-old")],
        vec![kv("a", "mid"), kv("b", "new")],
        vec![kv("a", "new")],
    ])
    .collect();

    assert_eq!(
        merged,
        vec![kv("a", "new"), kv("b", "new"), kv("c", "only-old")]
    );
}

#[test]
fn empty_sources_are_harmless() {
    let merged: Vec<KV> =
        MergeIterator::new(vec![vec![], vec![kv("x", "1")], vec![]]).collect();
    assert_eq!(merged, vec![kv("x", "1")]);

    let empty: Vec<KV> = MergeIterator::new(vec![]).collect();
    assert!(empty.is_empty());
}

#[test]
fn large_interleaved_merge_keeps_every_latest_value() {
    // Three generations writing overlapping key ranges.
    let gen = |start: usize, end: usize, tag: &str| -> Vec<KV> {
        (start..end)
            .map(|i| kv(&format!("key_{i:04}"), &format!("{tag}_{i}")))
            .collect()
    };
    let merged: Vec<KV> = MergeIterator::new(vec![
        gen(0, 300, "g0"),
        gen(100, 400, "g1"),
        gen(200, 500, "g2"),
    ])
    .collect();

    assert_eq!(merged.len(), 500);
    for (i, kv) in merged.iter().enumerate() {
        assert_eq!(kv.key, format!("key_{i:04}").into_bytes());
        let expect = if i >= 200 {
            format!("g2_{i}")
        } else if i >= 100 {
            format!("g1_{i}")
        } else {
            format!("g0_{i}")
        };
        assert_eq!(kv.value, expect.into_bytes(), "key_{i:04}");
    }
}
