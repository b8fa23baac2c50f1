use bloom::Filter;
use memtable::KV;
use sstable::{IndexEntry, SstReader};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use crate::config::Config;
use crate::{Error, Result};

/// An opened segment: the unit a group is made of.
///
/// Carries everything a point lookup needs without touching the file --
/// key range, block index and per-block filter bitmaps -- plus the open
/// reader for block fetches. `group_id` and `seq` are the two halves of the
/// `g{groupID}_{seq}.sst` filename; `seq` is the authoritative recency of
/// the segment within its group.
pub(crate) struct Node {
    conf: Arc<Config>,
    file_name: String,
    group_id: u64,
    seq: u64,
    size: u64,
    filters: BTreeMap<u64, Vec<u8>>,
    index: Vec<IndexEntry>,
    start_key: Vec<u8>,
    end_key: Vec<u8>,
    reader: SstReader,
    /// Probe side of the filter capability, used against stored bitmaps.
    probe: Box<dyn Filter>,
}

impl Node {
    /// Builds a handle from reader outputs (either fresh writer results or
    /// a re-read of an existing file).
    ///
    /// The end key is the last index key; the start key is decoded from the
    /// first entry of the first block.
    pub fn new(
        conf: Arc<Config>,
        file_name: String,
        reader: SstReader,
        group_id: u64,
        seq: u64,
        size: u64,
        filters: BTreeMap<u64, Vec<u8>>,
        index: Vec<IndexEntry>,
    ) -> Result<Arc<Node>> {
        if index.is_empty() {
            return Err(Error::Corrupt(format!("segment {file_name} has no blocks")));
        }
        let first_block = reader.read_block(index[0].block_offset, index[0].block_size)?;
        let start_key = match SstReader::read_block_entries(&first_block)?.into_iter().next() {
            Some(kv) => kv.key,
            None => return Err(Error::Corrupt(format!("segment {file_name} has an empty first block"))),
        };
        let end_key = index[index.len() - 1].key.clone();
        let probe = (conf.filter)();

        Ok(Arc::new(Node {
            conf,
            file_name,
            group_id,
            seq,
            size,
            filters,
            index,
            start_key,
            end_key,
            reader,
            probe,
        }))
    }

    /// Point lookup.
    ///
    /// Range check, then binary search of the index for the first entry
    /// whose separator key is >= `key`, then the block's filter bitmap,
    /// then a linear scan of the decoded block.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if key < self.start_key.as_slice() || key > self.end_key.as_slice() {
            return Ok(None);
        }

        let pos = self.index.partition_point(|e| e.key.as_slice() < key);
        if pos == self.index.len() {
            return Ok(None);
        }
        let entry = &self.index[pos];

        if let Some(bitmap) = self.filters.get(&entry.block_offset) {
            if !self.probe.maybe_contains(bitmap, key) {
                return Ok(None);
            }
        }

        let block = self.reader.read_block(entry.block_offset, entry.block_size)?;
        for kv in SstReader::read_block_entries(&block)? {
            if kv.key == key {
                return Ok(Some(kv.value));
            }
        }
        Ok(None)
    }

    /// Full in-order contents; drives group merges.
    pub fn get_all(&self) -> Result<Vec<KV>> {
        Ok(self.reader.read_all()?)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn start_key(&self) -> &[u8] {
        &self.start_key
    }

    pub fn end_key(&self) -> &[u8] {
        &self.end_key
    }

    /// Releases the reader handle; the file stays on disk.
    pub fn close(&self) {
        self.reader.close();
    }

    /// Closes the reader and unlinks the segment file. Called for segments
    /// replaced by compaction, after they left the group.
    pub fn destroy(&self) {
        self.reader.close();
        let path = self.conf.dir.join(&self.file_name);
        if let Err(e) = fs::remove_file(&path) {
            tracing::warn!(file = %path.display(), error = %e, "failed to unlink replaced segment");
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("file", &self.file_name)
            .field("group_id", &self.group_id)
            .field("seq", &self.seq)
            .field("size", &self.size)
            .field("blocks", &self.index.len())
            .finish()
    }
}
