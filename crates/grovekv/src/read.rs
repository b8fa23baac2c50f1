//! Read path: `get()`.
//!
//! Probe order is strict newest-to-oldest: the active buffer, then frozen
//! buffers youngest first, then groups youngest first (each group probes
//! its segments youngest-seq first). The first hit wins; there are no
//! tombstones to interpret.

use crate::{Result, Tree};

impl Tree {
    /// Looks up a key. `Ok(None)` means the key was never written.
    ///
    /// # Errors
    ///
    /// Surfaces the first segment-read failure (corruption or I/O).
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        {
            let data = self.inner.data.read().unwrap();

            if let Some(value) = data.memtable.get(key) {
                return Ok(Some(value));
            }

            for item in data.immutable.iter().rev() {
                if let Some(value) = item.memtable.get(key) {
                    return Ok(Some(value));
                }
            }
            // Engine lock drops here; the group list has its own lock.
        }

        let groups = self.inner.groups.read().unwrap();
        for group in groups.iter().rev() {
            if let Some(value) = group.get(key)? {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }
}
