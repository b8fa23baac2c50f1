//! # GroveKV - a group-partitioned LSM-tree storage engine
//!
//! A persistent, write-optimized key-value store. Instead of the classical
//! multi-level hierarchy, the on-disk tier is a single layer partitioned
//! into independent **groups** of segments; each group compacts on its own.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           TREE                               │
//! │                                                              │
//! │ put ──> WAL append ──> active memtable                       │
//! │                |                                             │
//! │                | (size x 5/4 > group_sst_size?)              │
//! │                v                                             │
//! │        rotate: freeze buffer, signal compactor               │
//! │                |                                             │
//! │                v                                             │
//! │        compactor: buffer ──> segment ──> group               │
//! │                |                                             │
//! │                | (group at compaction ratio?)                │
//! │                v                                             │
//! │        merge group segments, replace, unlink old             │
//! │                                                              │
//! │ get ──> active buffer ──> frozen buffers (newest first)      │
//! │             ──> groups (newest first, each newest-seq first) │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module responsibilities
//!
//! | Module       | Purpose                                             |
//! |--------------|-----------------------------------------------------|
//! | `lib.rs`     | `Tree` struct, constructor, close, `Debug`, `Drop`  |
//! | `config`     | `Config` builder, defaults, validation              |
//! | `node`       | segment handle: range, filters, index, point lookup |
//! | `group`      | segment partition: routing, merge, atomic replace   |
//! | `write`      | `put()`, buffer rotation                            |
//! | `read`       | `get()` probe order                                 |
//! | `compact`    | background worker: flush + group compaction         |
//! | `recovery`   | segment scan and WAL replay at startup              |
//!
//! ## Durability
//!
//! Every put is appended (and flushed) to the active buffer's WAL before
//! the in-memory insert. A WAL file is deleted only after its buffer's
//! segment is durably on disk, so killing the process at any point loses no
//! acknowledged write: surviving WALs replay on the next start. Pending
//! frozen buffers are deliberately *not* flushed on `close` -- their WALs
//! are the source of truth for the next start.

mod compact;
mod config;
mod error;
mod group;
mod node;
mod read;
mod recovery;
mod write;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use write::{MAX_KEY_SIZE, MAX_VALUE_SIZE};

use memtable::MemTable;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use wal::WalWriter;

use compact::CompactorCmd;
use group::Group;

/// A frozen memory buffer awaiting flush, paired with the WAL that backs
/// it. Identity-compared (`Arc::ptr_eq`) when the compactor retires it.
pub(crate) struct MemCompactItem {
    pub wal_path: PathBuf,
    pub memtable: Arc<dyn MemTable>,
}

/// Everything the write path mutates, guarded by one lock so in-memory
/// order always matches WAL order.
pub(crate) struct WriteState {
    /// Active read-write buffer.
    pub memtable: Arc<dyn MemTable>,
    /// WAL writer for the active buffer.
    pub wal: WalWriter,
    /// Frozen buffers, oldest first (newest last).
    pub immutable: Vec<Arc<MemCompactItem>>,
    /// Index of the active buffer; names its WAL file.
    pub mem_index: u64,
}

pub(crate) struct TreeInner {
    pub conf: Arc<Config>,
    pub data: RwLock<WriteState>,
    /// Groups sorted ascending by id; ids grow monotonically, so position
    /// order is age order.
    pub groups: RwLock<Vec<Arc<Group>>>,
    /// Group-id generator, seeded from the largest id seen on disk.
    pub group_seq: AtomicU64,
    /// Segment-seq generator, seeded from the largest seq seen on disk.
    pub sst_seq: AtomicU64,
    pub compactor_tx: Sender<CompactorCmd>,
    pub compactor: Mutex<Option<JoinHandle<()>>>,
    pub closed: AtomicBool,
}

impl TreeInner {
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn next_sst_seq(&self) -> u64 {
        self.sst_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn next_group_id(&self) -> u64 {
        self.group_seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// The storage engine. Safe to share across threads (`Arc<Tree>`); all
/// methods take `&self`.
pub struct Tree {
    inner: Arc<TreeInner>,
}

impl Tree {
    /// Opens (or creates) an engine over `conf.dir()`.
    ///
    /// Recovery order: rebuild the groups from `*.sst` files, seed the id
    /// and seq generators, start the compactor, then replay `walfile/*.wal`
    /// -- the newest WAL becomes the active buffer, the rest are queued for
    /// flush.
    pub fn new(conf: Config) -> Result<Tree> {
        let conf = Arc::new(conf);

        let groups = recovery::load_groups(&conf)?;
        let mem = recovery::load_memtables(&conf)?;

        tracing::info!(
            groups = groups.groups.len(),
            segments = groups.groups.iter().map(|g| g.node_count()).sum::<usize>(),
            pending_buffers = mem.immutable.len(),
            mem_index = mem.mem_index,
            "recovered tree state"
        );

        let (tx, rx) = std::sync::mpsc::channel();
        let inner = Arc::new(TreeInner {
            conf,
            data: RwLock::new(WriteState {
                memtable: mem.active,
                wal: mem.wal,
                immutable: mem.immutable.clone(),
                mem_index: mem.mem_index,
            }),
            groups: RwLock::new(groups.groups),
            group_seq: AtomicU64::new(groups.max_group_id),
            sst_seq: AtomicU64::new(groups.max_sst_seq),
            compactor_tx: tx,
            compactor: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        // Buffers recovered from older WALs still owe a flush.
        for item in &mem.immutable {
            let _ = inner.compactor_tx.send(CompactorCmd::Flush(Arc::clone(item)));
        }

        let worker = Arc::clone(&inner);
        let handle = std::thread::spawn(move || compact::run(worker, rx));
        *inner.compactor.lock().unwrap() = Some(handle);

        Ok(Tree { inner })
    }

    /// Stops the compactor and releases every segment handle. Idempotent.
    ///
    /// Frozen buffers still waiting for a flush are *not* written out;
    /// their WALs stay on disk and replay on the next start.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.compactor_tx.send(CompactorCmd::Shutdown);
        let handle = self.inner.compactor.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        let groups = self.inner.groups.write().unwrap();
        for group in groups.iter() {
            group.close();
        }
    }

    /// Number of frozen buffers still waiting for a flush.
    #[must_use]
    pub fn pending_buffer_count(&self) -> usize {
        self.inner.data.read().unwrap().immutable.len()
    }

    /// Number of groups currently on disk.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.inner.groups.read().unwrap().len()
    }

    /// Total number of segments across all groups.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.inner
            .groups
            .read()
            .unwrap()
            .iter()
            .map(|g| g.node_count())
            .sum()
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.inner.data.read().unwrap();
        f.debug_struct("Tree")
            .field("dir", &self.inner.conf.dir)
            .field("memtable_size", &data.memtable.size())
            .field("memtable_entries", &data.memtable.len())
            .field("frozen_buffers", &data.immutable.len())
            .field("mem_index", &data.mem_index)
            .field("groups", &self.group_count())
            .field("segments", &self.segment_count())
            .finish()
    }
}

/// Best-effort close on drop; an explicit [`close`](Tree::close) is
/// preferred but not required.
impl Drop for Tree {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests;
