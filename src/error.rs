//! Crate-wide error type.
//!
//! Every fallible operation in this crate returns [`Result<T>`], whose
//! error kinds correspond one-to-one with the failure modes a caller
//! must be able to distinguish: a bad constructor argument, a key that
//! does not parse, an on-disk file that does not match its own
//! metadata, a write-ahead log line that will not parse, or a C1 layer
//! that is already full.

use thiserror::Error;

/// Errors produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-provided argument fails a precondition (bloom filter
    /// rate, metric length, …).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A canonical key string could not be parsed.
    #[error("bad key format: {0}")]
    BadKeyFormat(String),

    /// An SSTable's data or metadata is internally inconsistent.
    #[error("corrupt sstable: {0}")]
    CorruptSSTable(String),

    /// A write-ahead log line could not be parsed during replay.
    #[error("corrupt write-ahead log: {0}")]
    CorruptWAL(String),

    /// A flush was attempted while the C1 layer was already at its
    /// configured capacity.
    #[error("C1 layer full ({0} sstables)")]
    C1Full(usize),

    /// A filesystem or memory-mapping operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
