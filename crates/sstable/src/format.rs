use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Result as IoResult, Write};

use crate::SstError;

/// Fixed footer size: four u64 little-endian fields.
pub const FOOTER_SIZE: u64 = 32;

/// The four offsets/sizes stored in the last 32 bytes of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub filter_offset: u64,
    pub filter_size: u64,
    pub index_offset: u64,
    pub index_size: u64,
}

impl Footer {
    /// Validates the footer against the file size: regions must be ordered
    /// `data | filter | index | footer` and lie inside the file.
    pub fn validate(&self, file_size: u64) -> Result<(), SstError> {
        let body_end = file_size - FOOTER_SIZE;
        let filter_end = self
            .filter_offset
            .checked_add(self.filter_size)
            .ok_or_else(|| SstError::Corrupt("filter region overflows".into()))?;
        let index_end = self
            .index_offset
            .checked_add(self.index_size)
            .ok_or_else(|| SstError::Corrupt("index region overflows".into()))?;

        if filter_end > self.index_offset || index_end > body_end {
            return Err(SstError::Corrupt(format!(
                "regions out of range: filter {}+{}, index {}+{}, body ends at {}",
                self.filter_offset, self.filter_size, self.index_offset, self.index_size, body_end
            )));
        }
        Ok(())
    }
}

/// One index entry per data block: the block's last key and its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Separator key for the block; any `x` with
    /// `last_key_of_block <= x < first_key_of_next_block` is valid, and the
    /// last key itself is always stored.
    pub key: Vec<u8>,
    pub block_offset: u64,
    pub block_size: u64,
}

pub fn write_footer<W: Write>(w: &mut W, footer: &Footer) -> IoResult<()> {
    w.write_u64::<LittleEndian>(footer.filter_offset)?;
    w.write_u64::<LittleEndian>(footer.filter_size)?;
    w.write_u64::<LittleEndian>(footer.index_offset)?;
    w.write_u64::<LittleEndian>(footer.index_size)?;
    Ok(())
}

pub fn read_footer(mut bytes: &[u8]) -> IoResult<Footer> {
    let filter_offset = bytes.read_u64::<LittleEndian>()?;
    let filter_size = bytes.read_u64::<LittleEndian>()?;
    let index_offset = bytes.read_u64::<LittleEndian>()?;
    let index_size = bytes.read_u64::<LittleEndian>()?;
    Ok(Footer {
        filter_offset,
        filter_size,
        index_offset,
        index_size,
    })
}

/// Length of the common prefix of `a` and `b`.
pub fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    let min = a.len().min(b.len());
    let mut i = 0;
    while i < min && a[i] == b[i] {
        i += 1;
    }
    i
}

/// Appends one shared-prefix-compressed entry to a block buffer.
///
/// `prev` is the previous key in the same block, empty for the first entry
/// (which therefore stores the whole key with `shared_len = 0`).
pub fn encode_entry(buf: &mut Vec<u8>, prev: &[u8], key: &[u8], value: &[u8]) {
    let shared = shared_prefix_len(prev, key);
    buf.extend_from_slice(&(shared as u32).to_le_bytes());
    buf.extend_from_slice(&((key.len() - shared) as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(&key[shared..]);
    buf.extend_from_slice(value);
}

/// Byte length [`encode_entry`] will produce for this pair.
pub fn encoded_len(prev: &[u8], key: &[u8], value: &[u8]) -> usize {
    12 + (key.len() - shared_prefix_len(prev, key)) + value.len()
}
