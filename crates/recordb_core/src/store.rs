//! Record store facade.

use crate::cipher::KeyCipher;
use crate::config::Config;
use crate::entity::EntityStore;
use crate::error::{CoreError, CoreResult};
use crate::journal::JournalStore;
use crate::lock::LockManager;
use crate::sequence::SequenceService;
use crate::table::TableCatalog;
use parking_lot::Mutex;
use recordb_storage::{DirectoryProvider, InMemoryProvider, StorageProvider};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Services shared by every journal and entity handle of one store.
pub(crate) struct StoreContext {
    pub(crate) config: Config,
    pub(crate) catalog: Arc<TableCatalog>,
    pub(crate) sequence: Arc<SequenceService>,
    pub(crate) cipher: KeyCipher,
    pub(crate) lock: LockManager,
    open: AtomicBool,
}

impl StoreContext {
    /// Fails once the owning store has been closed.
    pub(crate) fn ensure_open(&self) -> CoreResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoreError::illegal_state("record store is closed"))
        }
    }
}

/// The main record store handle.
///
/// A `RecordStore` owns the physical tables, the sequence allocator and the
/// store-wide lock. Journals and the entity store are views over it:
///
/// ```rust
/// use recordb_core::{Config, RecordStore, SortDirection};
///
/// let store = RecordStore::open_in_memory(Config::default().partition_capacity(2)).unwrap();
/// let journal = store.journal("events", "event").unwrap();
/// for payload in [b"a", b"b", b"c"] {
///     journal.append("event", payload).unwrap();
/// }
/// assert_eq!(journal.all_partitions(SortDirection::Ascending).unwrap().len(), 2);
///
/// let values: Vec<Vec<u8>> = journal
///     .entries_relative("event", SortDirection::Ascending, 1, Some(2))
///     .unwrap()
///     .map(|entry| entry.unwrap().value)
///     .collect();
/// assert_eq!(values, vec![b"b".to_vec(), b"c".to_vec()]);
/// store.close().unwrap();
/// ```
pub struct RecordStore {
    context: Arc<StoreContext>,
    journals: Mutex<HashMap<String, Arc<JournalStore>>>,
}

impl RecordStore {
    /// Opens a store in the directory at `path`.
    ///
    /// The directory is locked for the lifetime of the store; a second open
    /// from any process fails until this one is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the directory is
    /// missing (and `create_if_missing` is off) or locked, or the sequence
    /// tables cannot be read.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        let provider = DirectoryProvider::open(path, config.create_if_missing)?;
        tracing::info!(path = %path.display(), group = %config.group, "opening record store");
        Self::open_with_provider(Arc::new(provider), config)
    }

    /// Opens a store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn open_in_memory(config: Config) -> CoreResult<Self> {
        Self::open_with_provider(Arc::new(InMemoryProvider::new()), config)
    }

    /// Opens a store over an arbitrary table provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the sequence
    /// tables cannot be read.
    pub fn open_with_provider(provider: Arc<dyn StorageProvider>, config: Config) -> CoreResult<Self> {
        config.validate()?;
        let cipher = KeyCipher::from_passphrase(&config.key_passphrase)?;
        let catalog = Arc::new(TableCatalog::new(provider, config.sync_on_write));
        let sequence = Arc::new(SequenceService::open(&catalog, &config)?);
        let lock = LockManager::new("store", config.lock_timeout);

        Ok(Self {
            context: Arc::new(StoreContext {
                config,
                catalog,
                sequence,
                cipher,
                lock,
                open: AtomicBool::new(true),
            }),
            journals: Mutex::new(HashMap::new()),
        })
    }

    /// Opens (creating on first use) the journal `name` holding records of
    /// `data_type`, and recovers its active partition.
    ///
    /// The first call builds the journal; later calls for the same name
    /// return the same instance, so every writer shares one active
    /// partition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid name or type, or
    /// if the journal is already open with a different data type, and
    /// [`CoreError::IllegalState`] if the store is closed.
    pub fn journal(&self, name: &str, data_type: &str) -> CoreResult<Arc<JournalStore>> {
        self.context.ensure_open()?;
        let mut journals = self.journals.lock();
        if let Some(journal) = journals.get(name) {
            if journal.data_type() != data_type {
                return Err(CoreError::invalid_argument(format!(
                    "journal {name} holds {}, not {data_type}",
                    journal.data_type()
                )));
            }
            return Ok(Arc::clone(journal));
        }

        let journal = Arc::new(JournalStore::new(Arc::clone(&self.context), name, data_type)?);
        journal.initialize()?;
        journals.insert(name.to_string(), Arc::clone(&journal));
        Ok(journal)
    }

    /// Returns the typed entity store.
    #[must_use]
    pub fn entities(&self) -> EntityStore {
        EntityStore::new(Arc::clone(&self.context))
    }

    /// Returns the sequence allocator.
    #[must_use]
    pub fn sequence(&self) -> &SequenceService {
        &self.context.sequence
    }

    /// Returns the cipher used to render keys.
    #[must_use]
    pub fn cipher(&self) -> &KeyCipher {
        &self.context.cipher
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Checks if the store is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.context.open.load(Ordering::Acquire)
    }

    /// Persists counter positions and closes the store.
    ///
    /// Closing twice is a no-op. Handles obtained earlier fail with
    /// [`CoreError::IllegalState`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if counter positions cannot be written; the store
    /// then stays open.
    pub fn close(&self) -> CoreResult<()> {
        let _guard = self.context.lock.acquire()?;
        if !self.is_open() {
            return Ok(());
        }
        self.context.sequence.shutdown()?;
        self.context.open.store(false, Ordering::Release);
        tracing::info!(group = %self.context.config.group, "record store closed");
        Ok(())
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("group", &self.context.config.group)
            .field("open", &self.is_open())
            .field("sequence", &self.context.sequence)
            .finish_non_exhaustive()
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
