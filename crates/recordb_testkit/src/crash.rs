//! Crash simulation for recordb stores.
//!
//! A [`CrashHarness`] keeps the table provider alive across store
//! instances, so a test can "restart" a store either cleanly (with the
//! shutdown hook) or after a simulated crash (without it).
//!
//! ## Usage
//!
//! ```rust
//! use recordb_core::Config;
//! use recordb_testkit::CrashHarness;
//!
//! let harness = CrashHarness::new(Config::default().block_size(10));
//! let store = harness.open();
//! store.sequence().next_key("order").unwrap();
//! harness.crash(store);
//!
//! let store = harness.open();
//! assert_eq!(store.sequence().next_key("order").unwrap().id(), 11);
//! ```

use parking_lot::{Condvar, Mutex};
use recordb_core::{Config, RecordStore};
use recordb_storage::{InMemoryProvider, StorageBackend, StorageError, StorageProvider, StorageResult};
use std::collections::HashSet;
use std::sync::Arc;

/// Reopens stores over the same in-memory tables.
pub struct CrashHarness {
    provider: Arc<InMemoryProvider>,
    config: Config,
}

impl CrashHarness {
    /// Creates a harness with empty tables.
    pub fn new(config: Config) -> Self {
        crate::fixtures::init_tracing();
        Self {
            provider: Arc::new(InMemoryProvider::new()),
            config,
        }
    }

    /// Opens a store over the harness tables.
    pub fn open(&self) -> RecordStore {
        let provider: Arc<dyn StorageProvider> = self.provider.clone();
        RecordStore::open_with_provider(provider, self.config.clone()).expect("Failed to open store")
    }

    /// Shuts the store down cleanly.
    pub fn shutdown(&self, store: RecordStore) {
        store.close().expect("Failed to close store");
    }

    /// Abandons the store without running its shutdown hook.
    ///
    /// Everything already written to a table survives; in-memory allocator
    /// state is lost, as after a process crash.
    pub fn crash(&self, store: RecordStore) {
        tracing::debug!("simulating crash");
        // Skip Drop, which would persist counter positions.
        std::mem::forget(store);
    }

    /// Names of every table written so far.
    pub fn tables(&self) -> Vec<String> {
        self.provider.list().expect("Failed to list tables")
    }
}

/// Fault switches shared by a [`FaultyProvider`] and its backends.
#[derive(Default)]
struct Faults {
    failing: Mutex<HashSet<String>>,
    gate: Mutex<SyncGate>,
    gate_changed: Condvar,
}

#[derive(Default)]
struct SyncGate {
    prefix: Option<String>,
    held: usize,
}

fn injected(what: &str, table: &str) -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("simulated {what} failure on {table}"),
    ))
}

/// An in-memory provider whose tables can be made to fail appends or to
/// stall inside `sync`.
#[derive(Default)]
pub struct FaultyProvider {
    inner: InMemoryProvider,
    faults: Arc<Faults>,
}

impl FaultyProvider {
    /// Creates a provider with no faults armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every append to `table` fail until [`heal`](Self::heal).
    pub fn fail_appends(&self, table: &str) {
        self.faults.failing.lock().insert(table.to_string());
    }

    /// Lets appends to `table` succeed again.
    pub fn heal(&self, table: &str) {
        self.faults.failing.lock().remove(table);
    }

    /// Blocks `sync` on tables whose name starts with `prefix` until
    /// [`release_syncs`](Self::release_syncs).
    pub fn hold_syncs(&self, prefix: &str) {
        self.faults.gate.lock().prefix = Some(prefix.to_string());
    }

    /// Waits until at least one `sync` is being held.
    pub fn wait_for_held_sync(&self) {
        let mut gate = self.faults.gate.lock();
        while gate.held == 0 {
            self.faults.gate_changed.wait(&mut gate);
        }
    }

    /// Lets held and future syncs proceed.
    pub fn release_syncs(&self) {
        self.faults.gate.lock().prefix = None;
        self.faults.gate_changed.notify_all();
    }
}

impl StorageProvider for FaultyProvider {
    fn open(&self, name: &str) -> StorageResult<Box<dyn StorageBackend>> {
        Ok(Box::new(FaultyBackend {
            name: name.to_string(),
            inner: self.inner.open(name)?,
            faults: Arc::clone(&self.faults),
        }))
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.exists(name)
    }

    fn destroy(&self, name: &str) -> StorageResult<bool> {
        self.inner.destroy(name)
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        self.inner.list()
    }
}

struct FaultyBackend {
    name: String,
    inner: Box<dyn StorageBackend>,
    faults: Arc<Faults>,
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.faults.failing.lock().contains(&self.name) {
            return Err(injected("append", &self.name));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        {
            let mut gate = self.faults.gate.lock();
            let matches = |gate: &SyncGate| {
                gate.prefix
                    .as_deref()
                    .map_or(false, |prefix| self.name.starts_with(prefix))
            };
            if matches(&gate) {
                gate.held += 1;
                self.faults.gate_changed.notify_all();
                while matches(&gate) {
                    self.faults.gate_changed.wait(&mut gate);
                }
                gate.held -= 1;
            }
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_appends_can_be_healed() {
        let provider = FaultyProvider::new();
        let mut backend = provider.open("t").unwrap();
        backend.append(b"a").unwrap();

        provider.fail_appends("t");
        assert!(backend.append(b"b").is_err());
        assert!(provider.open("other").unwrap().append(b"c").is_ok());

        provider.heal("t");
        assert_eq!(backend.append(b"d").unwrap(), 1);
        assert_eq!(backend.size().unwrap(), 2);
    }

    #[test]
    fn held_sync_waits_for_release() {
        let provider = Arc::new(FaultyProvider::new());
        provider.hold_syncs("t");
        let mut backend = provider.open("t").unwrap();
        let syncing = std::thread::spawn(move || backend.sync());

        provider.wait_for_held_sync();
        assert!(!syncing.is_finished());
        provider.release_syncs();
        syncing.join().unwrap().unwrap();
    }
}
