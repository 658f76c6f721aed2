//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test scenarios.

use recordb_core::{Config, RecordStore};
use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: RecordStore,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates an in-memory test store with a custom configuration.
    pub fn memory_with(config: Config) -> Self {
        init_tracing();
        Self {
            store: RecordStore::open_in_memory(config).expect("Failed to open in-memory store"),
            _temp_dir: None,
        }
    }

    /// Creates a new directory-backed test store.
    pub fn file() -> Self {
        Self::file_with(Config::default())
    }

    /// Creates a directory-backed test store with a custom configuration.
    pub fn file_with(config: Config) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RecordStore::open(temp_dir.path(), config).expect("Failed to open file store");
        Self {
            store,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the store directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }
}

impl std::ops::Deref for TestStore {
    type Target = RecordStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use recordb_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     let journal = store.journal("events", "event").unwrap();
///     journal.append("event", b"payload").unwrap();
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&RecordStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary directory-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&RecordStore, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.store, path)
}

/// Installs a `tracing` subscriber for test output, once per process.
///
/// Honours `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use recordb_core::{JournalStore, Key};
    use std::sync::Arc;

    /// Appends `count` records to `journal`; record `i` holds `i` as
    /// big-endian bytes.
    pub fn fill_journal(journal: &JournalStore, count: u64) -> Vec<Key> {
        let data_type = journal.data_type().to_string();
        (0..count)
            .map(|i| {
                journal
                    .append(&data_type, &i.to_be_bytes())
                    .expect("Failed to append record")
            })
            .collect()
    }

    /// Creates a store with one journal of `count` records split into
    /// partitions of `capacity`.
    pub fn populated_journal(capacity: u64, count: u64) -> (TestStore, Arc<JournalStore>) {
        let store = TestStore::memory_with(Config::default().partition_capacity(capacity));
        let journal = store
            .journal("events", "event")
            .expect("Failed to open journal");
        fill_journal(&journal, count);
        (store, journal)
    }
}
