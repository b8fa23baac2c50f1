use memtable::KV;
use sstable::MergeIterator;
use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::node::Node;
use crate::Result;

/// One partition of the on-disk tier: a bounded set of segments sharing a
/// group id.
///
/// The segment vector is kept sorted by start key; segments may overlap.
/// Recency is carried by each segment's `seq`, so the read path probes in
/// descending seq order and merges feed ascending seq order. All mutation
/// of the vector, the aggregate range and the aggregate size happens under
/// the write half of `state`; readers hold the read half for the whole
/// lookup so compaction cannot free a segment mid-read.
pub(crate) struct Group {
    id: u64,
    conf: Arc<Config>,
    state: RwLock<GroupState>,
}

struct GroupState {
    nodes: Vec<Arc<Node>>,
    start_key: Option<Vec<u8>>,
    end_key: Option<Vec<u8>>,
    size: u64,
}

impl GroupState {
    /// Re-sorts by start key and recomputes the aggregate range and size.
    fn refresh(&mut self) {
        self.nodes.sort_by(|a, b| a.start_key().cmp(b.start_key()));
        self.size = self.nodes.iter().map(|n| n.size()).sum();
        self.start_key = self.nodes.iter().map(|n| n.start_key().to_vec()).min();
        self.end_key = self.nodes.iter().map(|n| n.end_key().to_vec()).max();
    }
}

impl Group {
    pub fn new(id: u64, conf: Arc<Config>) -> Self {
        Self {
            id,
            conf,
            state: RwLock::new(GroupState {
                nodes: Vec::new(),
                start_key: None,
                end_key: None,
                size: 0,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Adds a freshly flushed segment.
    pub fn add(&self, node: Arc<Node>) {
        let mut state = self.state.write().unwrap();
        state.nodes.push(node);
        state.refresh();
    }

    /// Atomically swaps compaction inputs for outputs. Readers either see
    /// the full old set or the full new set, never a mix.
    pub fn replace(&self, old: &[Arc<Node>], new: Vec<Arc<Node>>) {
        let mut state = self.state.write().unwrap();
        state
            .nodes
            .retain(|n| !old.iter().any(|o| Arc::ptr_eq(o, n)));
        state.nodes.extend(new);
        state.refresh();
    }

    /// Point lookup across the group's segments, youngest first.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let state = self.state.read().unwrap();

        match (&state.start_key, &state.end_key) {
            (Some(start), Some(end)) if key >= start.as_slice() && key <= end.as_slice() => {}
            _ => return Ok(None),
        }

        let mut by_recency: Vec<&Arc<Node>> = state.nodes.iter().collect();
        by_recency.sort_by(|a, b| b.seq().cmp(&a.seq()));
        for node in by_recency {
            if let Some(value) = node.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Merges every member segment into one sorted, deduplicated stream.
    /// Sources are fed oldest-first so younger segments overwrite on
    /// duplicate keys. This drives group compaction.
    pub fn get_all_kvs(&self) -> Result<Vec<KV>> {
        let state = self.state.read().unwrap();

        let mut by_age: Vec<&Arc<Node>> = state.nodes.iter().collect();
        by_age.sort_by_key(|n| n.seq());

        let mut sources = Vec::with_capacity(by_age.len());
        for node in by_age {
            sources.push(node.get_all()?);
        }
        Ok(MergeIterator::new(sources).collect())
    }

    /// Snapshot of the member segments, for compaction bookkeeping.
    pub fn nodes_snapshot(&self) -> Vec<Arc<Node>> {
        self.state.read().unwrap().nodes.clone()
    }

    pub fn node_count(&self) -> usize {
        self.state.read().unwrap().nodes.len()
    }

    pub fn start_key(&self) -> Option<Vec<u8>> {
        self.state.read().unwrap().start_key.clone()
    }

    pub fn end_key(&self) -> Option<Vec<u8>> {
        self.state.read().unwrap().end_key.clone()
    }

    /// A full group no longer accepts flush routing.
    pub fn is_full(&self) -> bool {
        self.node_count() >= self.conf.group_size
    }

    /// Compaction is due once the segment count reaches the configured
    /// fraction of the group cap.
    pub fn should_compact(&self) -> bool {
        let threshold = self.conf.group_size as f64 * self.conf.compaction_ratio;
        self.node_count() as f64 >= threshold
    }

    /// Releases every member segment's file handle.
    pub fn close(&self) {
        let state = self.state.write().unwrap();
        for node in state.nodes.iter() {
            node.close();
        }
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().unwrap();
        f.debug_struct("Group")
            .field("id", &self.id)
            .field("segments", &state.nodes.len())
            .field("size", &state.size)
            .finish()
    }
}
