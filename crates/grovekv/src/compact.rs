//! Background compactor: drains frozen buffers into segments and merges
//! saturated groups.
//!
//! A single long-running worker thread consumes one command channel. The
//! channel is FIFO, which gives the ordering guarantees for free: a
//! buffer's flush is fully acknowledged (segment added, item popped, WAL
//! deleted) before any compaction it triggered runs, and `Shutdown` is seen
//! only after the commands queued before it.
//!
//! Worker errors are logged and the offending operation is skipped; the
//! engine stays live. A failed flush leaves its buffer in the frozen queue
//! and its WAL on disk, so the data stays readable and durable.

use memtable::KV;
use sstable::{SstReader, SstWriter};
use std::fs;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::config::Config;
use crate::group::Group;
use crate::node::Node;
use crate::{MemCompactItem, Result, TreeInner};

pub(crate) enum CompactorCmd {
    /// A frozen buffer to drain into a new segment.
    Flush(Arc<MemCompactItem>),
    /// A group whose segments should be merged.
    CompactGroup(u64),
    /// Exit the worker.
    Shutdown,
}

/// Worker loop. Exits on `Shutdown` or when every sender is gone.
pub(crate) fn run(tree: Arc<TreeInner>, rx: Receiver<CompactorCmd>) {
    loop {
        match rx.recv() {
            Ok(CompactorCmd::Shutdown) | Err(_) => return,
            Ok(CompactorCmd::Flush(item)) => {
                // Commands queued behind close() are dropped: pending
                // buffers replay from their WALs on the next start.
                if tree.closed() {
                    continue;
                }
                if let Err(e) = flush_memtable(&tree, &item) {
                    tracing::error!(wal = %item.wal_path.display(), error = %e, "memtable flush failed");
                }
            }
            Ok(CompactorCmd::CompactGroup(group_id)) => {
                if tree.closed() {
                    continue;
                }
                if let Err(e) = compact_group(&tree, group_id) {
                    tracing::error!(group = group_id, error = %e, "group compaction failed");
                }
            }
        }
    }
}

/// Drains one frozen buffer to a new segment, then retires the buffer and
/// its WAL.
fn flush_memtable(tree: &Arc<TreeInner>, item: &Arc<MemCompactItem>) -> Result<()> {
    let kvs: Vec<KV> = item.memtable.iter_sorted().collect();

    if !kvs.is_empty() {
        let start_key = &kvs[0].key;
        let end_key = &kvs[kvs.len() - 1].key;
        let group = find_or_create_group(tree, start_key, end_key);

        let node = write_segment(tree, group.id(), &kvs)?;
        let seq = node.seq();
        let size = node.size();
        group.add(node);

        tracing::info!(
            group = group.id(),
            seq,
            entries = kvs.len(),
            size,
            "flushed memtable to segment"
        );

        try_trigger_group_compact(tree, group.id());
    }

    // The buffer's contents are durable in a segment (or it was empty):
    // retire the queue entry, then its WAL.
    {
        let mut data = tree.data.write().unwrap();
        if let Some(pos) = data.immutable.iter().position(|it| Arc::ptr_eq(it, item)) {
            data.immutable.remove(pos);
        }
    }
    if let Err(e) = fs::remove_file(&item.wal_path) {
        tracing::warn!(wal = %item.wal_path.display(), error = %e, "failed to delete flushed wal");
    }
    Ok(())
}

/// Routes a flushed key range to a group.
///
/// First group that is not full and either empty or overlapping the range
/// wins; otherwise a new group is allocated, and once the group cap is
/// reached the last group absorbs everything (degraded mode, compaction
/// catches up).
fn find_or_create_group(tree: &Arc<TreeInner>, start_key: &[u8], end_key: &[u8]) -> Arc<Group> {
    let mut groups = tree.groups.write().unwrap();

    for group in groups.iter() {
        if group.is_full() {
            continue;
        }
        let accepts = match (group.start_key(), group.end_key()) {
            (Some(gs), Some(ge)) => !(end_key < gs.as_slice() || start_key > ge.as_slice()),
            _ => true,
        };
        if accepts {
            return Arc::clone(group);
        }
    }

    if groups.len() >= tree.conf.max_groups {
        if let Some(last) = groups.last() {
            return Arc::clone(last);
        }
    }

    let group = Arc::new(Group::new(tree.next_group_id(), Arc::clone(&tree.conf)));
    groups.push(Arc::clone(&group));
    group
}

/// Emits a compaction command for the group if it crossed the threshold.
fn try_trigger_group_compact(tree: &Arc<TreeInner>, group_id: u64) {
    let groups = tree.groups.read().unwrap();
    if let Some(group) = groups.iter().find(|g| g.id() == group_id) {
        if group.should_compact() {
            let _ = tree.compactor_tx.send(CompactorCmd::CompactGroup(group_id));
        }
    }
}

/// Merges all segments of one group into as few segments as the size budget
/// allows, publishes the swap atomically, and unlinks the replaced files.
fn compact_group(tree: &Arc<TreeInner>, group_id: u64) -> Result<()> {
    let group = {
        let groups = tree.groups.read().unwrap();
        match groups.iter().find(|g| g.id() == group_id) {
            Some(g) => Arc::clone(g),
            None => return Ok(()),
        }
    };

    let old_nodes = group.nodes_snapshot();
    if old_nodes.len() <= 1 {
        return Ok(());
    }

    // Merged, deduplicated, last-write-wins.
    let kvs = group.get_all_kvs()?;
    if kvs.is_empty() {
        return Ok(());
    }

    let new_nodes = build_merged_segments(tree, group_id, &kvs)?;
    let merged = new_nodes.len();

    group.replace(&old_nodes, new_nodes);

    tracing::info!(
        group = group_id,
        replaced = old_nodes.len(),
        merged,
        entries = kvs.len(),
        "compacted group"
    );

    // Unlink outside the group lock; readers that raced the swap have
    // already finished (replace held the write lock).
    std::thread::spawn(move || {
        for node in old_nodes {
            node.destroy();
        }
    });
    Ok(())
}

/// Splits a merged KV list into segment-sized chunks and writes one segment
/// per chunk. A chunk ends when the accumulated key+value bytes would
/// exceed the segment budget. On any error the already-built segments are
/// destroyed.
fn build_merged_segments(
    tree: &Arc<TreeInner>,
    group_id: u64,
    kvs: &[KV],
) -> Result<Vec<Arc<Node>>> {
    let mut chunks: Vec<&[KV]> = Vec::new();
    let mut start = 0;
    let mut accumulated = 0u64;
    for (i, kv) in kvs.iter().enumerate() {
        let weight = kv.weight() as u64;
        if accumulated > 0 && accumulated + weight > tree.conf.group_sst_size {
            chunks.push(&kvs[start..i]);
            start = i;
            accumulated = 0;
        }
        accumulated += weight;
    }
    chunks.push(&kvs[start..]);

    let mut nodes: Vec<Arc<Node>> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match write_segment(tree, group_id, chunk) {
            Ok(node) => nodes.push(node),
            Err(e) => {
                for node in nodes.drain(..) {
                    node.destroy();
                }
                return Err(e);
            }
        }
    }
    Ok(nodes)
}

/// Writes one segment from a sorted KV slice and opens a handle on it.
fn write_segment(tree: &Arc<TreeInner>, group_id: u64, kvs: &[KV]) -> Result<Arc<Node>> {
    let seq = tree.next_sst_seq();
    let file_name = Config::sst_file_name(group_id, seq);
    let path = tree.conf.dir.join(&file_name);

    let mut writer = SstWriter::create(&path, tree.conf.sst_data_block_size, (tree.conf.filter)())?;
    for kv in kvs {
        writer.append(&kv.key, &kv.value)?;
    }
    let (size, filters, index) = writer.finish()?;

    let reader = SstReader::open(&path)?;
    Node::new(
        Arc::clone(&tree.conf),
        file_name,
        reader,
        group_id,
        seq,
        size,
        filters,
        index,
    )
}
