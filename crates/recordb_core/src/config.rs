//! Store configuration.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;

/// Default number of ids reserved per persisted counter write.
pub const DEFAULT_BLOCK_SIZE: u64 = 100_000;

/// Default number of records per journal partition.
pub const DEFAULT_PARTITION_CAPACITY: u64 = 100_000;

/// Configuration for opening a record store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix of every physical table name.
    pub group: String,

    /// Ids reserved per sequence block.
    pub block_size: u64,

    /// Records per journal partition before rotation.
    pub partition_capacity: u64,

    /// Refuse to create registry rows for types that were never registered.
    pub strict_types: bool,

    /// Bounded wait for the store lock. `None` blocks indefinitely.
    pub lock_timeout: Option<Duration>,

    /// Whether to fsync tables after every write.
    pub sync_on_write: bool,

    /// Input key material for the external key cipher.
    pub key_passphrase: String,

    /// Whether to create a store directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group: "recordb".to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            partition_capacity: DEFAULT_PARTITION_CAPACITY,
            strict_types: false,
            lock_timeout: None,
            sync_on_write: false,
            key_passphrase: "recordb-default-key".to_string(),
            create_if_missing: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table name prefix.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Sets the sequence block size.
    #[must_use]
    pub const fn block_size(mut self, size: u64) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the journal partition capacity.
    #[must_use]
    pub const fn partition_capacity(mut self, capacity: u64) -> Self {
        self.partition_capacity = capacity;
        self
    }

    /// Sets strict type-registry mode.
    #[must_use]
    pub const fn strict_types(mut self, value: bool) -> Self {
        self.strict_types = value;
        self
    }

    /// Sets a bounded wait for the store lock.
    #[must_use]
    pub const fn lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets whether to fsync after every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the key cipher passphrase.
    #[must_use]
    pub fn key_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.key_passphrase = passphrase.into();
        self
    }

    /// Sets whether to create a missing store directory.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Checks the values that the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a zero block size or
    /// capacity, an empty passphrase, or a group that is not a valid table
    /// name part.
    pub fn validate(&self) -> CoreResult<()> {
        if self.block_size == 0 {
            return Err(CoreError::invalid_argument("block_size must be positive"));
        }
        if self.partition_capacity == 0 {
            return Err(CoreError::invalid_argument(
                "partition_capacity must be positive",
            ));
        }
        if self.key_passphrase.is_empty() {
            return Err(CoreError::invalid_argument("key_passphrase must not be empty"));
        }
        recordb_storage::validate_table_name(&self.group)
            .map_err(|_| CoreError::invalid_argument(format!("invalid group {:?}", self.group)))
    }
}
