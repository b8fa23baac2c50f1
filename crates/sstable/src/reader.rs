use byteorder::{LittleEndian, ReadBytesExt};
use memtable::KV;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::{self, Footer, IndexEntry, FOOTER_SIZE};
use crate::{Result, SstError};

/// Maximum key size we'll allocate during reads (64 KiB). Prevents OOM on
/// corrupt files.
const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum value size we'll allocate during reads (10 MiB).
const MAX_VALUE_BYTES: usize = 10 * 1024 * 1024;
/// Maximum filter bitmap size we'll allocate during reads (1 MiB).
const MAX_FILTER_BYTES: usize = 1024 * 1024;

/// Random-access reader over a finished segment file.
///
/// Reading is stateless per call: each `read_*` seeks and decodes from the
/// persistent file handle, which is wrapped in a `Mutex` so calls work
/// through a shared `&self` reference. `close` releases the handle; further
/// reads fail with an I/O error.
pub struct SstReader {
    /// Path to the `.sst` file on disk (kept for diagnostics).
    #[allow(dead_code)]
    path: PathBuf,
    file: Mutex<Option<BufReader<File>>>,
    size: u64,
}

impl SstReader {
    /// Opens a segment file. Fails if the file is too small to carry a
    /// footer; full footer validation happens in [`read_footer`].
    ///
    /// [`read_footer`]: SstReader::read_footer
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        if size < FOOTER_SIZE {
            return Err(SstError::Corrupt(format!(
                "file too small for a footer: {size} bytes"
            )));
        }
        Ok(Self {
            path,
            file: Mutex::new(Some(BufReader::new(file))),
            size,
        })
    }

    /// Total file size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Releases the file handle. Idempotent.
    pub fn close(&self) {
        self.file.lock().unwrap().take();
    }

    /// Seeks to `offset` and reads exactly `len` bytes.
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut guard = self.file.lock().unwrap();
        let file = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "sstable reader is closed"))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Parses and validates the 32-byte footer.
    pub fn read_footer(&self) -> Result<Footer> {
        let bytes = self.read_at(self.size - FOOTER_SIZE, FOOTER_SIZE as usize)?;
        let footer = format::read_footer(&bytes)?;
        footer.validate(self.size)?;
        Ok(footer)
    }

    /// Reads the filter region: one membership bitmap per block, keyed by
    /// block offset.
    pub fn read_filter(&self) -> Result<BTreeMap<u64, Vec<u8>>> {
        let footer = self.read_footer()?;
        let region = self.read_at(footer.filter_offset, footer.filter_size as usize)?;

        let mut filters = BTreeMap::new();
        let mut cursor = &region[..];
        while !cursor.is_empty() {
            let block_offset = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
            let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            if len > MAX_FILTER_BYTES || len > cursor.len() {
                return Err(SstError::Corrupt(format!("filter bitmap length {len} out of range")));
            }
            filters.insert(block_offset, cursor[..len].to_vec());
            cursor = &cursor[len..];
        }
        Ok(filters)
    }

    /// Reads the index region: one `{last_key, offset, size}` entry per
    /// block, in file order (ascending keys).
    pub fn read_index(&self) -> Result<Vec<IndexEntry>> {
        let footer = self.read_footer()?;
        let region = self.read_at(footer.index_offset, footer.index_size as usize)?;

        let mut index = Vec::new();
        let mut cursor = &region[..];
        while !cursor.is_empty() {
            let key_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            if key_len > MAX_KEY_BYTES || key_len > cursor.len() {
                return Err(SstError::Corrupt(format!("index key length {key_len} out of range")));
            }
            let key = cursor[..key_len].to_vec();
            cursor = &cursor[key_len..];
            let block_offset = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
            let block_size = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
            index.push(IndexEntry {
                key,
                block_offset,
                block_size,
            });
        }
        Ok(index)
    }

    /// Reads `size` raw bytes of one data block at `offset`.
    pub fn read_block(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let end = offset
            .checked_add(size)
            .ok_or_else(|| SstError::Corrupt("block extent overflows".into()))?;
        if end > self.size - FOOTER_SIZE {
            return Err(SstError::Corrupt(format!(
                "block {offset}+{size} out of range"
            )));
        }
        self.read_at(offset, size as usize)
    }

    /// Decodes the shared-prefix-compressed entries of one block.
    pub fn read_block_entries(block: &[u8]) -> Result<Vec<KV>> {
        let mut kvs = Vec::new();
        let mut prev_key: Vec<u8> = Vec::new();
        let mut cursor = &block[..];

        while !cursor.is_empty() {
            let shared = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            let unshared = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            let value_len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;

            if shared > prev_key.len() {
                return Err(SstError::Corrupt(format!(
                    "shared prefix {shared} exceeds previous key length {}",
                    prev_key.len()
                )));
            }
            if shared + unshared > MAX_KEY_BYTES || value_len > MAX_VALUE_BYTES {
                return Err(SstError::Corrupt(format!(
                    "entry lengths out of range: key {}, value {value_len}",
                    shared + unshared
                )));
            }
            if unshared + value_len > cursor.len() {
                return Err(SstError::Corrupt("entry extends past block end".into()));
            }

            let mut key = Vec::with_capacity(shared + unshared);
            key.extend_from_slice(&prev_key[..shared]);
            key.extend_from_slice(&cursor[..unshared]);
            cursor = &cursor[unshared..];

            let value = cursor[..value_len].to_vec();
            cursor = &cursor[value_len..];

            prev_key = key.clone();
            kvs.push(KV::new(key, value));
        }
        Ok(kvs)
    }

    /// Streams every pair in the segment in ascending key order.
    pub fn read_all(&self) -> Result<Vec<KV>> {
        let index = self.read_index()?;
        let mut kvs = Vec::new();
        for entry in &index {
            let block = self.read_block(entry.block_offset, entry.block_size)?;
            kvs.extend(Self::read_block_entries(&block)?);
        }
        Ok(kvs)
    }
}

/// A short read inside a region means the region lied about its size.
fn truncated(_: io::Error) -> SstError {
    SstError::Corrupt("region truncated mid-entry".into())
}
