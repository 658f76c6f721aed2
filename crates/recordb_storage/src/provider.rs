//! Named table providers.
//!
//! A provider maps physical table names to byte stores. Directory-backed
//! stores use this layout:
//!
//! ```text
//! <root>/
//! ├─ LOCK                        # Advisory lock for single-writer
//! ├─ recordb.sequence.counters.tbl
//! ├─ recordb.orders.meta.tbl
//! └─ recordb.orders.p1.tbl       # One file per journal partition
//! ```

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const TABLE_EXTENSION: &str = "tbl";

/// Opens, enumerates and destroys named byte stores.
pub trait StorageProvider: Send + Sync {
    /// Opens the table called `name`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the table cannot be opened.
    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>>;

    /// Returns whether a table called `name` exists.
    fn exists(&self, name: &str) -> bool;

    /// Removes the table and all its bytes. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the table exists but cannot be removed.
    fn destroy(&self, name: &str) -> StorageResult<bool>;

    /// Lists all table names in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list(&self) -> StorageResult<Vec<String>>;
}

/// Checks that `name` only uses `[A-Za-z0-9._-]`.
///
/// # Errors
///
/// Returns [`StorageError::InvalidTableName`] otherwise.
pub fn validate_table_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidTableName {
            name: name.to_string(),
        })
    }
}

/// Provider keeping every table in memory.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    tables: Mutex<BTreeMap<String, InMemoryBackend>>,
}

impl InMemoryProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageProvider for InMemoryProvider {
    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        validate_table_name(name)?;
        let backend = self
            .tables
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone();
        Ok(Box::new(backend))
    }

    fn exists(&self, name: &str) -> bool {
        self.tables.lock().contains_key(name)
    }

    fn destroy(&self, name: &str) -> StorageResult<bool> {
        Ok(self.tables.lock().remove(name).is_some())
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        Ok(self.tables.lock().keys().cloned().collect())
    }
}

/// Provider storing one file per table inside a locked directory.
///
/// Only one `DirectoryProvider` may hold a directory at a time; the lock is
/// released when the provider is dropped.
#[derive(Debug)]
pub struct DirectoryProvider {
    root: PathBuf,
    _lock_file: File,
}

impl DirectoryProvider {
    /// Opens (and optionally creates) a store directory and locks it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the directory,
    /// or an I/O error if it is missing and `create_if_missing` is false.
    pub fn open(root: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !root.exists() {
            if create_if_missing {
                fs::create_dir_all(root)?;
            } else {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", root.display()),
                )));
            }
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: root.display().to_string(),
            });
        }
        tracing::debug!(root = %root.display(), "locked store directory");

        Ok(Self {
            root: root.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{TABLE_EXTENSION}"))
    }
}

impl StorageProvider for DirectoryProvider {
    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        validate_table_name(name)?;
        Ok(Box::new(FileBackend::open(&self.table_path(name))?))
    }

    fn exists(&self, name: &str) -> bool {
        validate_table_name(name).is_ok() && self.table_path(name).is_file()
    }

    fn destroy(&self, name: &str) -> StorageResult<bool> {
        validate_table_name(name)?;
        match fs::remove_file(self.table_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TABLE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
