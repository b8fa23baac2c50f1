use bloom::{BloomFilter, Filter, FilterConstructor};
use memtable::MemTableConstructor;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Bits per block bitmap emitted by the default bloom filter.
const DEFAULT_FILTER_BITS: u64 = 1024;

fn default_filter() -> Box<dyn Filter> {
    Box::new(BloomFilter::new(DEFAULT_FILTER_BITS))
}

/// Engine configuration. Build one with [`Config::new`]:
///
/// ```no_run
/// use grovekv::Config;
///
/// let conf = Config::new("/var/lib/grovekv")
///     .group_size(10)
///     .group_sst_size(10 * 1024 * 1024)
///     .build()
///     .unwrap();
/// ```
pub struct Config {
    /// Root directory for segment files; WALs live under `dir/walfile/`.
    pub(crate) dir: PathBuf,
    /// Max segments per group before compaction is forced.
    pub(crate) group_size: usize,
    /// Target segment size; also the buffer rotation threshold (x4/5).
    pub(crate) group_sst_size: u64,
    /// Cap on the number of groups.
    pub(crate) max_groups: usize,
    /// Fraction of `group_size` that triggers compaction.
    pub(crate) compaction_ratio: f64,
    /// Block size inside a segment.
    pub(crate) sst_data_block_size: usize,
    /// Fsync every WAL append.
    pub(crate) wal_sync: bool,
    /// Approximate-membership capability.
    pub(crate) filter: FilterConstructor,
    /// Ordered in-memory buffer capability.
    pub(crate) memtable: MemTableConstructor,
}

impl Config {
    /// Starts a builder with the defaults: 10 segments per group, 10 MiB
    /// segments, 100 groups, 0.8 compaction ratio, 16 KiB blocks, bloom
    /// filter, skiplist memtable.
    pub fn new<P: AsRef<Path>>(dir: P) -> ConfigBuilder {
        ConfigBuilder {
            dir: dir.as_ref().to_path_buf(),
            group_size: 10,
            group_sst_size: 10 * 1024 * 1024,
            max_groups: 100,
            compaction_ratio: 0.8,
            sst_data_block_size: 16 * 1024,
            wal_sync: false,
            filter: default_filter,
            memtable: memtable::new_skiplist,
        }
    }

    pub(crate) fn wal_dir(&self) -> PathBuf {
        self.dir.join("walfile")
    }

    pub(crate) fn wal_path(&self, index: u64) -> PathBuf {
        self.wal_dir().join(format!("{index}.wal"))
    }

    pub(crate) fn sst_file_name(group_id: u64, seq: u64) -> String {
        format!("g{group_id}_{seq}.sst")
    }

    /// Root directory this engine stores its files in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("dir", &self.dir)
            .field("group_size", &self.group_size)
            .field("group_sst_size", &self.group_sst_size)
            .field("max_groups", &self.max_groups)
            .field("compaction_ratio", &self.compaction_ratio)
            .field("sst_data_block_size", &self.sst_data_block_size)
            .field("wal_sync", &self.wal_sync)
            .finish()
    }
}

/// Builder for [`Config`]. Unset options keep their defaults; out-of-range
/// options fail `build` with [`Error::Config`].
pub struct ConfigBuilder {
    dir: PathBuf,
    group_size: usize,
    group_sst_size: u64,
    max_groups: usize,
    compaction_ratio: f64,
    sst_data_block_size: usize,
    wal_sync: bool,
    filter: FilterConstructor,
    memtable: MemTableConstructor,
}

impl ConfigBuilder {
    /// Max segments per group before compaction is forced.
    pub fn group_size(mut self, n: usize) -> Self {
        self.group_size = n;
        self
    }

    /// Target segment size in bytes; the memory buffer rotates at 4/5 of it.
    pub fn group_sst_size(mut self, bytes: u64) -> Self {
        self.group_sst_size = bytes;
        self
    }

    /// Cap on the number of groups.
    pub fn max_groups(mut self, n: usize) -> Self {
        self.max_groups = n;
        self
    }

    /// Fraction of `group_size` at which a group is scheduled for
    /// compaction. Must lie in (0, 1).
    pub fn compaction_ratio(mut self, ratio: f64) -> Self {
        self.compaction_ratio = ratio;
        self
    }

    /// Block size inside a segment.
    pub fn sst_data_block_size(mut self, bytes: usize) -> Self {
        self.sst_data_block_size = bytes;
        self
    }

    /// Fsync every WAL append instead of only flushing.
    pub fn wal_sync(mut self, sync: bool) -> Self {
        self.wal_sync = sync;
        self
    }

    /// Injects an approximate-membership implementation.
    pub fn filter(mut self, ctor: FilterConstructor) -> Self {
        self.filter = ctor;
        self
    }

    /// Injects an ordered in-memory table implementation.
    pub fn memtable(mut self, ctor: MemTableConstructor) -> Self {
        self.memtable = ctor;
        self
    }

    /// Validates the options and creates the storage directories.
    pub fn build(self) -> Result<Config> {
        if self.group_size == 0 {
            return Err(Error::Config("group_size must be at least 1".into()));
        }
        if self.group_sst_size == 0 {
            return Err(Error::Config("group_sst_size must be non-zero".into()));
        }
        if self.max_groups == 0 {
            return Err(Error::Config("max_groups must be at least 1".into()));
        }
        if !(self.compaction_ratio > 0.0 && self.compaction_ratio < 1.0) {
            return Err(Error::Config(format!(
                "compaction_ratio must lie in (0, 1), got {}",
                self.compaction_ratio
            )));
        }
        if self.sst_data_block_size == 0 {
            return Err(Error::Config("sst_data_block_size must be non-zero".into()));
        }

        let conf = Config {
            dir: self.dir,
            group_size: self.group_size,
            group_sst_size: self.group_sst_size,
            max_groups: self.max_groups,
            compaction_ratio: self.compaction_ratio,
            sst_data_block_size: self.sst_data_block_size,
            wal_sync: self.wal_sync,
            filter: self.filter,
            memtable: self.memtable,
        };

        fs::create_dir_all(&conf.dir)?;
        fs::create_dir_all(conf.wal_dir())?;
        Ok(conf)
    }
}
