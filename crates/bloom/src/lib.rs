//! # Bloom Filter
//!
//! Approximate-membership capability for the GroveKV storage engine.
//!
//! A bloom filter can tell you with certainty that a key is **not** in a set
//! (no false negatives), but may occasionally report that a key **is** in the
//! set when it isn't (false positives).
//!
//! ## Usage in GroveKV
//!
//! The segment writer builds one bitmap per sealed data block from that
//! block's keys. During point lookups the segment handle consults the bitmap
//! for the candidate block first -- if it says "not present", the block read
//! is skipped entirely.
//!
//! The [`Filter`] trait is the capability boundary: the engine only knows how
//! to buffer keys, serialize a bitmap and probe a stored bitmap. Swapping in
//! a different membership structure is a matter of implementing the trait and
//! passing a different constructor to the engine config.

use std::io::{self, Read};

/// Approximate-membership capability used by the segment writer and reader.
///
/// One `Filter` instance lives for the duration of a segment write. Keys are
/// buffered with [`insert`](Filter::insert); when a data block is sealed,
/// [`serialize`](Filter::serialize) emits a self-describing bitmap for the
/// buffered keys and resets the buffer for the next block.
/// [`maybe_contains`](Filter::maybe_contains) deserializes a stored bitmap
/// and probes it.
pub trait Filter: Send + Sync {
    /// Buffers a key for the block currently being built.
    fn insert(&mut self, key: &[u8]);

    /// Emits the bitmap for all keys inserted since the last call and resets
    /// the key buffer.
    fn serialize(&mut self) -> Vec<u8>;

    /// Probes a bitmap previously produced by [`serialize`](Filter::serialize).
    ///
    /// Returns `false` only when the key is definitely absent. A bitmap that
    /// cannot be parsed yields `true` -- absence cannot be proven from
    /// garbage, so the lookup falls through to the block read.
    fn maybe_contains(&self, bitmap: &[u8], key: &[u8]) -> bool;
}

/// Constructor injected through the engine config.
pub type FilterConstructor = fn() -> Box<dyn Filter>;

/// Serialized bitmaps should stay small; reject anything absurd when
/// deserializing so a corrupt segment cannot force a huge allocation.
const MAX_BITMAP_BYTES: usize = 1024 * 1024;

/// A bloom filter using double hashing: `h(i) = h1 + i * h2` where `h1` and
/// `h2` are FNV-1a hashes with two different bases.
///
/// The filter is sized by a fixed number of bits per block; the number of
/// hash functions is derived from the actual key count at serialization
/// time, so small blocks automatically get more probes per key.
pub struct BloomFilter {
    /// Bits per emitted bitmap.
    num_bits: u64,
    /// Hash pairs of the keys buffered for the current block.
    pending: Vec<(u64, u64)>,
}

impl BloomFilter {
    /// Creates a filter that emits `num_bits`-bit bitmaps (rounded up to a
    /// whole number of bytes). Values below 64 are clamped.
    pub fn new(num_bits: u64) -> Self {
        Self {
            num_bits: num_bits.max(64),
            pending: Vec::new(),
        }
    }

    /// Number of keys buffered for the current block.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.pending.len()
    }

    /// Deserializes a bitmap produced by [`serialize`](Filter::serialize).
    ///
    /// Wire format (all little-endian):
    /// ```text
    /// [num_bits: u64][num_hashes: u32][bits_len: u32][bits: bytes]
    /// ```
    fn read_from<R: Read>(r: &mut R) -> io::Result<(u64, u32, Vec<u8>)> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        r.read_exact(&mut buf8)?;
        let num_bits = u64::from_le_bytes(buf8);

        r.read_exact(&mut buf4)?;
        let num_hashes = u32::from_le_bytes(buf4);

        r.read_exact(&mut buf4)?;
        let bits_len = u32::from_le_bytes(buf4) as usize;

        if bits_len > MAX_BITMAP_BYTES || num_hashes == 0 || num_bits == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible bloom header: {num_bits} bits, {num_hashes} hashes, {bits_len} bytes"),
            ));
        }

        let mut bits = vec![0u8; bits_len];
        r.read_exact(&mut bits)?;
        Ok((num_bits, num_hashes, bits))
    }
}

impl Filter for BloomFilter {
    fn insert(&mut self, key: &[u8]) {
        self.pending.push(hash_pair(key));
    }

    fn serialize(&mut self) -> Vec<u8> {
        let n = self.pending.len().max(1);

        // Optimal number of hashes for m bits and n keys: k = (m/n) * ln(2).
        let k = ((self.num_bits as f64 / n as f64) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.clamp(1, 30);

        let byte_len = ((self.num_bits + 7) / 8) as usize;
        let mut bits = vec![0u8; byte_len];
        for &(h1, h2) in &self.pending {
            for i in 0..k {
                let idx = bit_index(h1, h2, i, self.num_bits);
                bits[(idx / 8) as usize] |= 1 << (idx % 8);
            }
        }
        self.pending.clear();

        let mut out = Vec::with_capacity(16 + byte_len);
        out.extend_from_slice(&self.num_bits.to_le_bytes());
        out.extend_from_slice(&k.to_le_bytes());
        out.extend_from_slice(&(bits.len() as u32).to_le_bytes());
        out.extend_from_slice(&bits);
        out
    }

    fn maybe_contains(&self, bitmap: &[u8], key: &[u8]) -> bool {
        let mut cursor = bitmap;
        let (num_bits, num_hashes, bits) = match Self::read_from(&mut cursor) {
            Ok(parsed) => parsed,
            Err(_) => return true,
        };

        let (h1, h2) = hash_pair(key);
        for i in 0..num_hashes {
            let idx = bit_index(h1, h2, i, num_bits);
            let byte = match bits.get((idx / 8) as usize) {
                Some(b) => *b,
                None => return true,
            };
            if (byte >> (idx % 8)) & 1 == 0 {
                return false;
            }
        }
        true
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("pending_keys", &self.pending.len())
            .finish()
    }
}

/// Double hashing: h(i) = (h1 + i * h2) mod num_bits.
fn bit_index(h1: u64, h2: u64, i: u32, num_bits: u64) -> u64 {
    h1.wrapping_add((i as u64).wrapping_mul(h2)) % num_bits
}

/// Computes two independent 64-bit hashes using FNV-1a with different bases.
fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h1 = fnv1a_64(key, 0xcbf29ce484222325);
    let h2 = fnv1a_64(key, 0x517cc1b727220a95);
    (h1, h2)
}

/// FNV-1a 64-bit hash with a configurable starting basis.
fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
