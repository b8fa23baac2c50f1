//! Cold-start recovery: rebuild the group layout from `*.sst` files and
//! the memory buffers from `walfile/*.wal`.
//!
//! The group layout is fully encoded in segment filenames
//! (`g{groupID}_{seq}.sst`), so there is no manifest to replay. Unknown
//! filenames are ignored; a `.sst` file whose name does not parse is
//! skipped with a warning. WAL files sort by their numeric index; the
//! newest becomes the active buffer and the rest are returned as frozen
//! buffers still owing a flush.

use memtable::MemTable;
use sstable::SstReader;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use wal::{WalReader, WalWriter};

use crate::config::Config;
use crate::group::Group;
use crate::node::Node;
use crate::{MemCompactItem, Result};

pub(crate) struct GroupRecovery {
    pub groups: Vec<Arc<Group>>,
    /// Largest group id observed; seeds the id generator.
    pub max_group_id: u64,
    /// Largest segment seq observed; seeds the seq generator.
    pub max_sst_seq: u64,
}

pub(crate) struct MemRecovery {
    pub active: Arc<dyn MemTable>,
    pub wal: WalWriter,
    pub mem_index: u64,
    /// Buffers restored from older WALs, oldest first. Each still owes a
    /// flush.
    pub immutable: Vec<Arc<MemCompactItem>>,
}

/// Parses `g{groupID}_{seq}.sst`.
fn parse_sst_file_name(name: &str) -> Option<(u64, u64)> {
    let rest = name.strip_suffix(".sst")?.strip_prefix('g')?;
    let (group, seq) = rest.split_once('_')?;
    Some((group.parse().ok()?, seq.parse().ok()?))
}

/// Parses `{index}.wal`.
fn parse_wal_file_name(name: &str) -> Option<u64> {
    name.strip_suffix(".wal")?.parse().ok()
}

/// Scans the segment directory and reconstructs the groups, sorted
/// ascending by id.
pub(crate) fn load_groups(conf: &Arc<Config>) -> Result<GroupRecovery> {
    cleanup_tmp_files(&conf.dir);

    let mut by_group: BTreeMap<u64, Vec<(u64, String)>> = BTreeMap::new();
    let mut max_group_id = 0u64;
    let mut max_sst_seq = 0u64;

    for entry in fs::read_dir(&conf.dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".sst") {
            continue;
        }
        let Some((group_id, seq)) = parse_sst_file_name(name) else {
            tracing::warn!(file = name, "skipping segment with unparsable name");
            continue;
        };
        max_group_id = max_group_id.max(group_id);
        max_sst_seq = max_sst_seq.max(seq);
        by_group.entry(group_id).or_default().push((seq, name.to_string()));
    }

    // BTreeMap iteration is ascending by group id, which is the group
    // list's invariant order.
    let mut groups = Vec::with_capacity(by_group.len());
    for (group_id, mut files) in by_group {
        files.sort();
        let group = Arc::new(Group::new(group_id, Arc::clone(conf)));
        for (seq, file_name) in files {
            group.add(load_node(conf, file_name, group_id, seq)?);
        }
        groups.push(group);
    }

    Ok(GroupRecovery {
        groups,
        max_group_id,
        max_sst_seq,
    })
}

/// Opens one segment file as a handle: footer, filter region and index are
/// re-read from disk.
fn load_node(conf: &Arc<Config>, file_name: String, group_id: u64, seq: u64) -> Result<Arc<Node>> {
    let path = conf.dir.join(&file_name);
    let reader = SstReader::open(&path)?;
    let filters = reader.read_filter()?;
    let index = reader.read_index()?;
    let size = reader.size();
    Node::new(Arc::clone(conf), file_name, reader, group_id, seq, size, filters, index)
}

/// Replays the WAL directory into memory buffers.
///
/// With no WAL on disk a fresh buffer starts at index 0. Otherwise every
/// WAL is replayed in index order; the last one becomes the active buffer
/// and its file is reopened for append.
pub(crate) fn load_memtables(conf: &Arc<Config>) -> Result<MemRecovery> {
    let mut wals: Vec<(u64, PathBuf)> = Vec::new();
    for entry in fs::read_dir(conf.wal_dir())? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(".wal") {
            continue;
        }
        let Some(index) = parse_wal_file_name(name) else {
            tracing::warn!(file = name, "skipping wal with unparsable name");
            continue;
        };
        wals.push((index, entry.path()));
    }
    wals.sort();

    let Some((last_index, last_path)) = wals.pop() else {
        return Ok(MemRecovery {
            active: Arc::from((conf.memtable)()),
            wal: WalWriter::create(conf.wal_path(0), conf.wal_sync)?,
            mem_index: 0,
            immutable: Vec::new(),
        });
    };

    let mut immutable = Vec::with_capacity(wals.len());
    for (_, path) in wals {
        let memtable = replay_wal(conf, &path)?;
        immutable.push(Arc::new(MemCompactItem {
            wal_path: path,
            memtable,
        }));
    }

    let active = replay_wal(conf, &last_path)?;
    let wal = WalWriter::create(&last_path, conf.wal_sync)?;

    Ok(MemRecovery {
        active,
        wal,
        mem_index: last_index,
        immutable,
    })
}

/// Replays one WAL file into a fresh buffer.
fn replay_wal(conf: &Arc<Config>, path: &Path) -> Result<Arc<dyn MemTable>> {
    let memtable: Arc<dyn MemTable> = Arc::from((conf.memtable)());
    let mut reader = WalReader::open(path)?;
    reader.replay(|key, value| memtable.put(&key, &value))?;
    Ok(memtable)
}

/// Removes leftover `.sst.tmp` files from interrupted segment writes.
fn cleanup_tmp_files(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.ends_with(".sst.tmp") {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(file = name, error = %e, "failed to remove orphaned tmp file");
            }
        }
    }
}
