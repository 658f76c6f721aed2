//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of a table.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Attempted to truncate a table to a size larger than its contents.
    #[error("cannot truncate to {requested} bytes, table holds {size}")]
    TruncatePastEnd {
        /// The requested size.
        requested: u64,
        /// The current storage size.
        size: u64,
    },

    /// A physical table name contains characters the provider cannot store.
    #[error("invalid table name: {name:?}")]
    InvalidTableName {
        /// The rejected name.
        name: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access to {path}")]
    Locked {
        /// Directory that could not be locked.
        path: String,
    },
}
