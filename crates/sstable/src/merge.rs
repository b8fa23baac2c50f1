//! N-way merge over sorted key/value streams.
//!
//! Produces pairs in ascending key order. When the same key appears in more
//! than one source, only the entry from the **youngest** source (highest
//! source index) is emitted. This is the core primitive for group
//! compaction: feed the member segments' contents oldest-first and the
//! merged output resolves duplicates last-write-wins.

use memtable::KV;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A pending pair from one source, used for heap-based merge ordering.
struct HeapEntry {
    kv: KV,
    /// Index into the source list; higher means younger.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.kv.key == other.kv.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the key comparison so the
        // smallest key surfaces first. On equal keys the younger source
        // (higher index) surfaces first and shadows the rest.
        other
            .kv
            .key
            .cmp(&self.kv.key)
            .then_with(|| self.source.cmp(&other.source))
    }
}

/// Merges N sorted streams into one sorted, deduplicated stream.
///
/// Sources must each be sorted ascending with distinct keys; order the list
/// oldest-first so that on duplicate keys the later (younger) source wins.
pub struct MergeIterator {
    iters: Vec<std::vec::IntoIter<KV>>,
    heap: BinaryHeap<HeapEntry>,
}

impl MergeIterator {
    pub fn new(sources: Vec<Vec<KV>>) -> Self {
        let mut iters: Vec<std::vec::IntoIter<KV>> = Vec::with_capacity(sources.len());
        let mut heap = BinaryHeap::new();
        for (source, kvs) in sources.into_iter().enumerate() {
            let mut iter = kvs.into_iter();
            if let Some(kv) = iter.next() {
                heap.push(HeapEntry { kv, source });
            }
            iters.push(iter);
        }
        Self { iters, heap }
    }

    fn refill(&mut self, source: usize) {
        if let Some(kv) = self.iters[source].next() {
            self.heap.push(HeapEntry { kv, source });
        }
    }
}

impl Iterator for MergeIterator {
    type Item = KV;

    fn next(&mut self) -> Option<KV> {
        let top = self.heap.pop()?;
        self.refill(top.source);

        // Drain older entries for the same key.
        while let Some(peek) = self.heap.peek() {
            if peek.kv.key != top.kv.key {
                break;
            }
            let Some(dup) = self.heap.pop() else { break };
            self.refill(dup.source);
        }

        Some(top.kv)
    }
}
