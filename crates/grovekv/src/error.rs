use std::io;
use thiserror::Error;

/// Errors surfaced by the engine API.
#[derive(Debug, Error)]
pub enum Error {
    /// A filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A segment or WAL record is malformed.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// An internal precondition was violated.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Invalid configuration, returned from construction.
    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<wal::WalError> for Error {
    fn from(e: wal::WalError) -> Self {
        match e {
            wal::WalError::Io(io) => Error::Io(io),
            wal::WalError::Corrupt => Error::Corrupt("wal record".into()),
        }
    }
}

impl From<sstable::SstError> for Error {
    fn from(e: sstable::SstError) -> Self {
        match e {
            sstable::SstError::Io(io) => Error::Io(io),
            sstable::SstError::Corrupt(msg) => Error::Corrupt(msg),
            sstable::SstError::KeyOrder => {
                Error::Invariant("segment keys must be strictly ascending".into())
            }
        }
    }
}
