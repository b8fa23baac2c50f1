//! # SSTable - sorted segment files
//!
//! Immutable, on-disk storage files for the GroveKV storage engine.
//!
//! When an in-memory buffer reaches its rotation threshold the compactor
//! drains it to disk as a segment. Segments are *write-once, read-many* --
//! once published they are never modified, only replaced during group
//! compaction.
//!
//! ## File layout
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA REGION (concatenated blocks, each <= block_size bytes)    │
//! │                                                               │
//! │ per entry, shared-prefix compressed against the previous      │
//! │ key in the block (first entry of a block has shared_len = 0): │
//! │                                                               │
//! │ shared_len (u32) | unshared_len (u32) | value_len (u32)       │
//! │ unshared_key_bytes | value_bytes                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FILTER REGION (one membership bitmap per block)                │
//! │                                                               │
//! │ block_offset (u64) | bitmap_len (u32) | bitmap_bytes          │
//! │ ... repeated per block, ascending by offset ...               │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX REGION (one entry per block)                             │
//! │                                                               │
//! │ key_len (u32) | last_key_of_block | block_offset (u64)        │
//! │ block_size (u64)                                              │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 32 bytes)                                  │
//! │                                                               │
//! │ filter_offset (u64) | filter_size (u64)                       │
//! │ index_offset (u64)  | index_size (u64)                        │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Keys inside a segment are strictly
//! ascending; the index key for a block is the block's last key, which is a
//! valid separator between adjacent blocks.
//!
//! Writers publish atomically: the file is assembled under a `.sst.tmp`
//! name, fsynced, then renamed into place. Readers reject files whose
//! footer cannot be parsed.

use std::io;
use thiserror::Error;

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{Footer, IndexEntry, FOOTER_SIZE};
pub use merge::MergeIterator;
pub use reader::SstReader;
pub use writer::SstWriter;

/// Errors raised by segment reads and writes.
#[derive(Debug, Error)]
pub enum SstError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A malformed segment: bad footer, out-of-range offsets, shared-prefix
    /// underflow or implausible lengths.
    #[error("corrupt sstable: {0}")]
    Corrupt(String),

    /// Keys must be appended in strictly ascending order.
    #[error("key appended out of order")]
    KeyOrder,
}

pub type Result<T> = std::result::Result<T, SstError>;

#[cfg(test)]
mod tests;
