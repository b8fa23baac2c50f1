//! Write path: `put()` and buffer rotation.
//!
//! Every mutation appends to the active WAL first, then lands in the active
//! memory buffer, both under the engine write lock so in-memory order
//! always matches WAL order. When the buffer approaches the segment size
//! budget it is frozen and handed to the compactor.

use std::sync::Arc;
use wal::WalWriter;

use crate::compact::CompactorCmd;
use crate::{Error, MemCompactItem, Result, Tree, WriteState};

/// Maximum allowed key size in bytes (64 KiB).
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Maximum allowed value size in bytes (10 MiB).
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

impl Tree {
    /// Inserts a key-value pair. Same-key writes replace the prior value.
    ///
    /// The record is durable in the WAL before this returns; a WAL failure
    /// is surfaced without touching the buffer.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::Invariant("key must not be empty".into()));
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(Error::Invariant(format!(
                "key too large: {} bytes (max {MAX_KEY_SIZE})",
                key.len()
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(Error::Invariant(format!(
                "value too large: {} bytes (max {MAX_VALUE_SIZE})",
                value.len()
            )));
        }

        let mut data = self.inner.data.write().unwrap();

        data.wal.append(key, value)?;
        data.memtable.put(key, value);

        // Rotation reserves a fifth of the segment budget for block, filter
        // and index overhead, so the flushed segment lands under
        // group_sst_size.
        if (data.memtable.size() as u64).saturating_mul(5) / 4 <= self.inner.conf.group_sst_size {
            return Ok(());
        }
        self.rotate_locked(&mut data)
    }

    /// Freezes the active buffer and installs a fresh one. Caller holds the
    /// engine write lock.
    fn rotate_locked(&self, data: &mut WriteState) -> Result<()> {
        // The frozen buffer's WAL must be durable before the buffer is
        // allowed to reach a segment and be deleted.
        data.wal.sync_to_disk()?;

        let next_index = data.mem_index + 1;
        let new_wal = WalWriter::create(self.inner.conf.wal_path(next_index), self.inner.conf.wal_sync)?;

        let item = Arc::new(MemCompactItem {
            wal_path: self.inner.conf.wal_path(data.mem_index),
            memtable: Arc::clone(&data.memtable),
        });
        data.immutable.push(Arc::clone(&item));

        // Old writer drops here, closing the frozen buffer's WAL handle.
        data.wal = new_wal;
        data.mem_index = next_index;
        data.memtable = Arc::from((self.inner.conf.memtable)());

        let _ = self.inner.compactor_tx.send(CompactorCmd::Flush(item));
        Ok(())
    }
}
