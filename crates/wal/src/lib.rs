//! # WAL — Write-Ahead Log
//!
//! Crash-safe durability for the GroveKV storage engine.
//!
//! Every put is serialized into a binary record and appended to the WAL
//! **before** the corresponding memory-buffer insert. One WAL file backs
//! exactly one memory buffer; when the buffer's segment is durably on disk
//! the engine deletes the file. On restart the surviving WALs are replayed
//! in filename order to reconstruct the buffers.
//!
//! ## Binary record format
//!
//! ```text
//! [record_len: u32 LE][crc32: u32 LE][key_len: u32 LE][key][value_len: u32 LE][value]
//! ```
//!
//! `record_len` includes the 4-byte CRC but **not** itself. The CRC covers
//! everything after it.
//!
//! ## Recovery semantics
//!
//! Replay is best-effort from the prefix: a truncated tail record (crash
//! mid-write) or a record failing its CRC ends replay at the last good
//! record. Everything the writer flushed before the bad record is recovered.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use thiserror::Error;

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record that cannot be valid regardless of file length (absurd
    /// declared size).
    #[error("corrupt record")]
    Corrupt,
}

/// A record must stay well below this; anything larger is corruption.
const MAX_RECORD_SIZE: u32 = 64 * 1024 * 1024;

/// Append-only WAL writer.
///
/// Records are serialized into a reusable scratch buffer, CRC-checksummed,
/// and written with a single `write_all` followed by a flush, so a record is
/// in the OS page cache before `append` returns. When `sync` is `true`,
/// every append is additionally followed by `sync_all()` (fsync).
pub struct WalWriter {
    file: File,
    sync: bool,
    /// Reusable scratch buffer to avoid allocation on every append.
    buf: Vec<u8>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode.
    pub fn create<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, WalError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file,
            sync,
            buf: Vec::with_capacity(256),
        })
    }

    /// Serializes one `(key, value)` record and appends it.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<(), WalError> {
        self.buf.clear();

        // Reserve the frame header (record_len + crc), filled in below.
        self.buf.extend_from_slice(&[0u8; 8]);

        self.buf.write_u32::<LittleEndian>(key.len() as u32)?;
        self.buf.extend_from_slice(key);
        self.buf.write_u32::<LittleEndian>(value.len() as u32)?;
        self.buf.extend_from_slice(value);

        let body = &self.buf[8..];
        let mut hasher = Crc32::new();
        hasher.update(body);
        let crc = hasher.finalize();

        let record_len = (body.len() as u64) + 4;
        if record_len > MAX_RECORD_SIZE as u64 {
            return Err(WalError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "WAL record too large",
            )));
        }

        self.buf[0..4].copy_from_slice(&(record_len as u32).to_le_bytes());
        self.buf[4..8].copy_from_slice(&crc.to_le_bytes());

        self.file.write_all(&self.buf)?;
        self.file.flush()?;

        if self.sync {
            self.file.sync_all()?;
        }

        Ok(())
    }

    /// Forces buffered data down to disk via `sync_all()`.
    ///
    /// Used at rotation when `sync` is `false`, so a frozen buffer's WAL is
    /// durable before the buffer is handed to the compactor.
    pub fn sync_to_disk(&mut self) -> Result<(), WalError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Sequential WAL reader.
///
/// Generic over any `Read` implementor so unit tests can replay from
/// in-memory buffers.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every recoverable record, calling `apply(key, value)` for
    /// each one in write order.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** → `Ok(())`.
    /// - **Truncated tail** (partial record at end) → `Ok(())` after
    ///   yielding the complete records before it.
    /// - **CRC mismatch** → `Ok(())`; the bad record and everything after
    ///   it are discarded (best-effort prefix recovery).
    /// - **Absurd declared record size** → `Err(WalError::Corrupt)`.
    /// - **I/O error** → `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(Vec<u8>, Vec<u8>),
    {
        let mut body = Vec::with_capacity(256);

        loop {
            let record_len = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            // record_len includes the CRC (4 bytes) but not itself.
            if record_len <= 4 || record_len > MAX_RECORD_SIZE {
                return Err(WalError::Corrupt);
            }

            let crc = match self.rdr.read_u32::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            };

            let body_len = (record_len - 4) as usize;
            body.clear();
            body.resize(body_len, 0);
            match self.rdr.read_exact(&mut body) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(WalError::Io(e)),
            }

            let mut hasher = Crc32::new();
            hasher.update(&body);
            if hasher.finalize() != crc {
                // Bad checksum: stop at the last good record.
                return Ok(());
            }

            let mut br = &body[..];
            let key_len = br.read_u32::<LittleEndian>()? as usize;
            if key_len > br.len() {
                return Ok(());
            }
            let mut key = vec![0u8; key_len];
            br.read_exact(&mut key)?;

            let value_len = br.read_u32::<LittleEndian>()? as usize;
            if value_len > br.len() {
                return Ok(());
            }
            let mut value = vec![0u8; value_len];
            br.read_exact(&mut value)?;

            apply(key, value);
        }
    }
}
