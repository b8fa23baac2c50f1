use bloom::Filter;
use byteorder::{LittleEndian, WriteBytesExt};
use std::collections::BTreeMap;
use std::fs::{rename, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::format::{encode_entry, encoded_len, write_footer, Footer, IndexEntry};
use crate::{Result, SstError};

/// Streams a strictly ascending sequence of key/value pairs into a segment
/// file.
///
/// Entries accumulate in an in-memory block buffer; when the next entry
/// would push the buffer past `block_size` the block is sealed: its bytes go
/// to the file, its last key goes to the index, and the filter bitmap for
/// its keys is recorded against the block's offset. [`finish`] seals the
/// trailing block, appends the filter and index regions plus the footer,
/// fsyncs, and atomically renames the temp file into place.
///
/// [`finish`]: SstWriter::finish
pub struct SstWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<std::fs::File>,
    block_size: usize,
    filter: Box<dyn Filter>,

    /// Bytes of the data region already written to the file.
    written: u64,
    /// The block currently being assembled.
    block: Vec<u8>,
    /// Previous key within the current block (prefix-compression context).
    prev_in_block: Vec<u8>,
    /// Last key appended overall; enforces strict ordering and names sealed
    /// blocks in the index.
    last_key: Vec<u8>,

    filters: BTreeMap<u64, Vec<u8>>,
    index: Vec<IndexEntry>,
}

impl SstWriter {
    /// Opens a writer targeting `path`. The bytes land in `{path}.tmp` until
    /// [`finish`](SstWriter::finish) renames them into place, so a crashed
    /// write never leaves a readable-looking segment behind.
    pub fn create<P: AsRef<Path>>(path: P, block_size: usize, filter: Box<dyn Filter>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = path.with_extension("sst.tmp");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            path,
            tmp_path,
            file: BufWriter::new(file),
            block_size,
            filter,
            written: 0,
            block: Vec::with_capacity(block_size),
            prev_in_block: Vec::new(),
            last_key: Vec::new(),
            filters: BTreeMap::new(),
            index: Vec::new(),
        })
    }

    /// Appends one pair. Keys must be strictly greater than every previously
    /// appended key.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() || (!self.last_key.is_empty() && key <= self.last_key.as_slice()) {
            return Err(SstError::KeyOrder);
        }

        // Seal the current block first if this entry would overflow it.
        if !self.block.is_empty()
            && self.block.len() + encoded_len(&self.prev_in_block, key, value) > self.block_size
        {
            self.seal_block()?;
        }

        encode_entry(&mut self.block, &self.prev_in_block, key, value);
        self.filter.insert(key);
        self.prev_in_block.clear();
        self.prev_in_block.extend_from_slice(key);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        Ok(())
    }

    /// Flushes the current block to the file and records its index entry and
    /// filter bitmap.
    fn seal_block(&mut self) -> Result<()> {
        let offset = self.written;
        self.file.write_all(&self.block)?;
        self.written += self.block.len() as u64;

        self.index.push(IndexEntry {
            key: self.last_key.clone(),
            block_offset: offset,
            block_size: self.block.len() as u64,
        });
        self.filters.insert(offset, self.filter.serialize());

        self.block.clear();
        self.prev_in_block.clear();
        Ok(())
    }

    /// Seals the trailing block, writes the filter region, index region and
    /// footer, fsyncs and renames the file into place.
    ///
    /// Returns the final file size, the per-block filter bitmaps keyed by
    /// block offset, and the block index.
    pub fn finish(mut self) -> Result<(u64, BTreeMap<u64, Vec<u8>>, Vec<IndexEntry>)> {
        if !self.block.is_empty() {
            self.seal_block()?;
        }
        if self.index.is_empty() {
            return Err(SstError::Corrupt("refusing to write an empty segment".into()));
        }

        let filter_offset = self.written;
        let mut filter_size = 0u64;
        for (block_offset, bitmap) in &self.filters {
            self.file.write_u64::<LittleEndian>(*block_offset)?;
            self.file.write_u32::<LittleEndian>(bitmap.len() as u32)?;
            self.file.write_all(bitmap)?;
            filter_size += 12 + bitmap.len() as u64;
        }

        let index_offset = filter_offset + filter_size;
        let mut index_size = 0u64;
        for entry in &self.index {
            self.file.write_u32::<LittleEndian>(entry.key.len() as u32)?;
            self.file.write_all(&entry.key)?;
            self.file.write_u64::<LittleEndian>(entry.block_offset)?;
            self.file.write_u64::<LittleEndian>(entry.block_size)?;
            index_size += 20 + entry.key.len() as u64;
        }

        write_footer(
            &mut self.file,
            &Footer {
                filter_offset,
                filter_size,
                index_offset,
                index_size,
            },
        )?;

        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        rename(&self.tmp_path, &self.path)?;

        let size = index_offset + index_size + crate::FOOTER_SIZE;
        Ok((size, self.filters, self.index))
    }
}
