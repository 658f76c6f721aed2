//! Registry of open tables.

use crate::error::CoreResult;
use crate::table::store::Table;
use parking_lot::Mutex;
use recordb_storage::StorageProvider;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the physical name of a table.
///
/// Names are `<group>.<store>.<part>` so every table of a store shares a
/// prefix and partitions of different journals never collide.
#[must_use]
pub fn table_name(group: &str, store: &str, part: &str) -> String {
    format!("{group}.{store}.{part}")
}

/// Opens tables through a [`StorageProvider`] and caches the handles.
///
/// All users of one physical table share a single [`Table`] so its index
/// stays authoritative.
pub struct TableCatalog {
    provider: Arc<dyn StorageProvider>,
    sync_on_write: bool,
    open: Mutex<HashMap<String, Arc<Table>>>,
}

impl TableCatalog {
    /// Creates a catalog over `provider`.
    pub fn new(provider: Arc<dyn StorageProvider>, sync_on_write: bool) -> Self {
        Self {
            provider,
            sync_on_write,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Opens `name`, creating the table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the log cannot be read.
    pub fn open(&self, name: &str) -> CoreResult<Arc<Table>> {
        let mut open = self.open.lock();
        if let Some(table) = open.get(name) {
            return Ok(Arc::clone(table));
        }

        let backend = self.provider.open(name)?;
        let table = Arc::new(Table::open(name, backend, self.sync_on_write)?);
        tracing::debug!(table = name, rows = table.len(), "opened table");
        open.insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// Opens `name` only if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the table exists but cannot be read.
    pub fn open_existing(&self, name: &str) -> CoreResult<Option<Arc<Table>>> {
        if let Some(table) = self.open.lock().get(name) {
            return Ok(Some(Arc::clone(table)));
        }
        if !self.provider.exists(name) {
            return Ok(None);
        }
        self.open(name).map(Some)
    }

    /// Returns whether the table exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.open.lock().contains_key(name) || self.provider.exists(name)
    }

    /// Destroys the table and its bytes. Returns `false` if it did not exist.
    ///
    /// Cursors that already hold the table keep reading their snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot remove the table.
    pub fn destroy(&self, name: &str) -> CoreResult<bool> {
        let cached = self.open.lock().remove(name).is_some();
        let removed = self.provider.destroy(name)?;
        Ok(cached || removed)
    }

    /// Lists the tables whose names start with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot list tables.
    pub fn list(&self, prefix: &str) -> CoreResult<Vec<String>> {
        Ok(self
            .provider
            .list()?
            .into_iter()
            .filter(|name| name.starts_with(prefix))
            .collect())
    }
}

impl std::fmt::Debug for TableCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCatalog")
            .field("open_tables", &self.open.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordb_storage::InMemoryProvider;

    fn catalog() -> TableCatalog {
        TableCatalog::new(Arc::new(InMemoryProvider::new()), false)
    }

    #[test]
    fn names_are_dotted() {
        assert_eq!(table_name("g", "orders", "p3"), "g.orders.p3");
    }

    #[test]
    fn open_shares_handles() {
        let catalog = catalog();
        let a = catalog.open("g.s.t").unwrap();
        let b = catalog.open("g.s.t").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn open_existing_never_creates() {
        let catalog = catalog();
        assert!(catalog.open_existing("g.s.t").unwrap().is_none());
        assert!(!catalog.exists("g.s.t"));

        catalog.open("g.s.t").unwrap().put(b"k", b"v").unwrap();
        assert!(catalog.open_existing("g.s.t").unwrap().is_some());
    }

    #[test]
    fn destroy_removes_rows() {
        let catalog = catalog();
        catalog.open("g.s.t").unwrap().put(b"k", b"v").unwrap();

        assert!(catalog.destroy("g.s.t").unwrap());
        assert!(!catalog.destroy("g.s.t").unwrap());
        assert!(catalog.open("g.s.t").unwrap().is_empty());
    }

    #[test]
    fn list_filters_by_prefix() {
        let catalog = catalog();
        catalog.open("g.a.p1").unwrap();
        catalog.open("g.a.p2").unwrap();
        catalog.open("g.b.p1").unwrap();
        assert_eq!(catalog.list("g.a.").unwrap().len(), 2);
    }
}
