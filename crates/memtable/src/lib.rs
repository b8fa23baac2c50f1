//! # Memtable - ordered in-memory buffer
//!
//! The mutable, sorted front of the GroveKV write path. Every `put` lands
//! here (after the WAL append) until the buffer reaches its rotation
//! threshold, at which point the engine freezes it and the compactor drains
//! it into an on-disk segment.
//!
//! The [`MemTable`] trait is the capability boundary: the engine only needs
//! ordered insert/lookup, byte-size accounting and a sorted iterator. Two
//! implementations are provided:
//!
//! - [`Skiplist`] (default) -- a lock-free skip list, cheap concurrent
//!   reads while the engine write lock serializes writers.
//! - [`BTreeTable`] -- a `BTreeMap` behind a read-write lock; simpler,
//!   handy as a reference implementation in tests.
//!
//! Overwrite-only semantics: a repeated key replaces the previous value and
//! the size accounting is adjusted by the delta. There are no tombstones.

use crossbeam_skiplist::SkipMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// A key-value pair. Keys are compared lexicographically as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KV {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KV {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    /// Encoded weight of the pair: key bytes plus value bytes.
    #[must_use]
    pub fn weight(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// Ordered in-memory table capability.
///
/// While a table is active it is only written by the engine's write path
/// under the engine write lock; the `&self` signatures exist so frozen
/// tables can be shared with the compactor and the read path without
/// additional wrapping.
pub trait MemTable: Send + Sync {
    /// Inserts or replaces a key.
    fn put(&self, key: &[u8], value: &[u8]);

    /// Returns the value for `key`, if present.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Sum of key+value bytes currently held.
    fn size(&self) -> usize;

    /// Number of distinct keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates all pairs in ascending key order.
    fn iter_sorted(&self) -> Box<dyn Iterator<Item = KV> + '_>;
}

/// Constructor injected through the engine config.
pub type MemTableConstructor = fn() -> Box<dyn MemTable>;

/// Default memtable: a concurrent skip list.
pub struct Skiplist {
    map: SkipMap<Vec<u8>, Vec<u8>>,
    size: AtomicUsize,
}

impl Skiplist {
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }
}

impl Default for Skiplist {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable for Skiplist {
    fn put(&self, key: &[u8], value: &[u8]) {
        // Size accounting assumes the single-writer discipline of the engine
        // write lock: look up the value being replaced, then insert.
        if let Some(old) = self.map.get(key) {
            self.size
                .fetch_sub(key.len() + old.value().len(), Ordering::Relaxed);
        }
        self.size
            .fetch_add(key.len() + value.len(), Ordering::Relaxed);
        self.map.insert(key.to_vec(), value.to_vec());
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn iter_sorted(&self) -> Box<dyn Iterator<Item = KV> + '_> {
        Box::new(
            self.map
                .iter()
                .map(|entry| KV::new(entry.key().clone(), entry.value().clone())),
        )
    }
}

/// Alternative memtable: `BTreeMap` behind a read-write lock.
pub struct BTreeTable {
    inner: RwLock<BTreeInner>,
}

struct BTreeInner {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    size: usize,
}

impl BTreeTable {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeInner {
                map: BTreeMap::new(),
                size: 0,
            }),
        }
    }
}

impl Default for BTreeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable for BTreeTable {
    fn put(&self, key: &[u8], value: &[u8]) {
        let mut inner = self.inner.write().unwrap();
        let replaced = inner.map.get(key).map(|old| key.len() + old.len());
        if let Some(bytes) = replaced {
            inner.size -= bytes;
        }
        inner.size += key.len() + value.len();
        inner.map.insert(key.to_vec(), value.to_vec());
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner.read().unwrap().map.get(key).cloned()
    }

    fn size(&self) -> usize {
        self.inner.read().unwrap().size
    }

    fn len(&self) -> usize {
        self.inner.read().unwrap().map.len()
    }

    fn iter_sorted(&self) -> Box<dyn Iterator<Item = KV> + '_> {
        let snapshot: Vec<KV> = self
            .inner
            .read()
            .unwrap()
            .map
            .iter()
            .map(|(k, v)| KV::new(k.clone(), v.clone()))
            .collect();
        Box::new(snapshot.into_iter())
    }
}

/// Default constructor: skip list.
pub fn new_skiplist() -> Box<dyn MemTable> {
    Box::new(Skiplist::new())
}

/// Alternative constructor: BTreeMap table.
pub fn new_btree_table() -> Box<dyn MemTable> {
    Box::new(BTreeTable::new())
}
