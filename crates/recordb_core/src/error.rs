//! Error types for recordb core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in recordb core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] recordb_storage::StorageError),

    /// CBOR encoding or decoding of a metadata row failed.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Caller supplied an invalid argument. Nothing was mutated.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// Operation is not permitted in the current state.
    #[error("illegal state: {message}")]
    IllegalState {
        /// Description of why the transition is rejected.
        message: String,
    },

    /// An identifier could not be allocated or its reservation persisted.
    #[error("allocation failed: {message}")]
    Allocation {
        /// Description of the failure.
        message: String,
    },

    /// Type name is not registered and the registry refused to create it.
    #[error("unknown type: {name}")]
    UnknownType {
        /// The type name.
        name: String,
    },

    /// Integer type tag has no registry row.
    #[error("unknown type id: {id}")]
    UnknownTypeId {
        /// The type tag.
        id: u32,
    },

    /// External key string could not be decoded.
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Description of the failure.
        message: String,
    },

    /// Table bytes are damaged.
    #[error("table corruption in {table}: {message}")]
    TableCorruption {
        /// Physical table name.
        table: String,
        /// Description of the corruption.
        message: String,
    },

    /// Record checksum mismatch.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Optimistic concurrency check failed.
    #[error("version conflict: expected {expected}, found {actual}")]
    VersionConflict {
        /// Version the caller expected.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// A bounded lock wait expired.
    #[error("timed out after {millis} ms waiting for the {lock} lock")]
    LockTimeout {
        /// Which lock.
        lock: &'static str,
        /// Configured wait.
        millis: u128,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivationFailed {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an illegal state error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Creates an allocation error.
    pub fn allocation(message: impl Into<String>) -> Self {
        Self::Allocation {
            message: message.into(),
        }
    }

    /// Creates an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Creates a table corruption error.
    pub fn table_corruption(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TableCorruption {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a key derivation error.
    pub fn key_derivation_failed(message: impl Into<String>) -> Self {
        Self::KeyDerivationFailed {
            message: message.into(),
        }
    }

    /// Creates an encryption error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Returns whether retrying the same call could succeed.
    ///
    /// Invalid input and illegal transitions never succeed on retry; storage
    /// and lock failures might.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Allocation { .. } | Self::LockTimeout { .. }
        )
    }
}
