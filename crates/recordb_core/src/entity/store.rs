//! Entity store for CRUD operations.

use crate::error::{CoreError, CoreResult};
use crate::key::Key;
use crate::store::StoreContext;
use crate::table::{table_name, ScanOptions, Table, TableCursor};
use crate::types::{SortDirection, TypeId, Versioned};
use std::sync::Arc;

const ENTITY_STORE: &str = "entity";

/// Typed entities addressed by [`Key`]s, one table per type.
///
/// Keys come from the store's sequence allocator, so ids of one type are
/// shared with any journal of that type. Writes serialize on the store-wide
/// lock; reads do not take it.
pub struct EntityStore {
    context: Arc<StoreContext>,
}

impl EntityStore {
    pub(crate) fn new(context: Arc<StoreContext>) -> Self {
        Self { context }
    }

    fn table_name(&self, type_id: TypeId) -> String {
        table_name(
            &self.context.config.group,
            ENTITY_STORE,
            &type_id.as_u32().to_string(),
        )
    }

    fn table(&self, type_id: TypeId) -> CoreResult<Arc<Table>> {
        self.context.catalog.open(&self.table_name(type_id))
    }

    /// Finds the table holding `key`, if its type and table exist.
    fn locate(&self, key: &Key) -> CoreResult<Option<(Arc<Table>, Vec<u8>)>> {
        let resolved = match self.context.sequence.resolve_key(key) {
            Ok(resolved) => resolved,
            Err(CoreError::UnknownType { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(self
            .context
            .catalog
            .open_existing(&self.table_name(resolved.type_id))?
            .map(|table| (table, resolved.to_bytes().to_vec())))
    }

    /// Stores `value` under a freshly allocated key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid type name,
    /// [`CoreError::Allocation`] if no id can be issued, and
    /// [`CoreError::IllegalState`] if the store is closed.
    pub fn create(&self, type_name: &str, value: &[u8]) -> CoreResult<Key> {
        let _guard = self.context.lock.acquire()?;
        self.context.ensure_open()?;

        let key = self.context.sequence.next_key(type_name)?;
        let resolved = self.context.sequence.resolve_key(&key)?;
        self.table(resolved.type_id)?
            .insert(&resolved.to_bytes(), value)?;
        Ok(key)
    }

    /// Stores `value` under a caller-supplied key.
    ///
    /// The type's counter is moved past the key's id so later allocations
    /// never collide with it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Allocation`] if the id lies beyond the type's
    /// reserved block and [`CoreError::IllegalState`] if the key is taken.
    pub fn create_with_key(&self, key: &Key, value: &[u8]) -> CoreResult<()> {
        let _guard = self.context.lock.acquire()?;
        self.context.ensure_open()?;

        self.context.sequence.bump_key(key.type_name(), key.id())?;
        let resolved = self.context.sequence.resolve_key(key)?;
        self.table(resolved.type_id)?
            .insert(&resolved.to_bytes(), value)?;
        Ok(())
    }

    /// Returns the latest value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be read.
    pub fn retrieve(&self, key: &Key) -> CoreResult<Option<Versioned>> {
        match self.locate(key)? {
            Some((table, row_key)) => table.get(&row_key),
            None => Ok(None),
        }
    }

    /// Replaces the value under `key`. Returns `false` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionConflict`] if `expected_version` is given
    /// and the stored version differs.
    pub fn update(&self, key: &Key, value: &[u8], expected_version: Option<u64>) -> CoreResult<bool> {
        let _guard = self.context.lock.acquire()?;
        self.context.ensure_open()?;
        match self.locate(key)? {
            Some((table, row_key)) => table.update(&row_key, value, expected_version),
            None => Ok(false),
        }
    }

    /// Deletes `key`. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the tombstone cannot be written.
    pub fn delete(&self, key: &Key) -> CoreResult<bool> {
        let _guard = self.context.lock.acquire()?;
        self.context.ensure_open()?;
        match self.locate(key)? {
            Some((table, row_key)) => table.delete(&row_key),
            None => Ok(false),
        }
    }

    /// Iterates the entities of one type in id order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid type name.
    pub fn iterate(
        &self,
        type_name: &str,
        direction: SortDirection,
        offset: u64,
        limit: Option<u64>,
    ) -> CoreResult<EntityCursor> {
        crate::key::validate_type_name(type_name)?;
        let type_name: Arc<str> = Arc::from(type_name);
        let Some(type_id) = self.context.sequence.find_type_id(&type_name) else {
            return Ok(EntityCursor {
                inner: None,
                type_name,
            });
        };

        let mut options = ScanOptions::new(direction).offset(offset);
        options.limit = limit;
        let inner = self
            .context
            .catalog
            .open_existing(&self.table_name(type_id))?
            .map(|table| table.scan(options));
        Ok(EntityCursor { inner, type_name })
    }

    /// Number of live entities of a type.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be opened.
    pub fn count(&self, type_name: &str) -> CoreResult<usize> {
        let Some(type_id) = self.context.sequence.find_type_id(type_name) else {
            return Ok(0);
        };
        Ok(self
            .context
            .catalog
            .open_existing(&self.table_name(type_id))?
            .map_or(0, |table| table.len()))
    }

    /// Destroys every entity of a type. Returns `false` if there were none.
    ///
    /// The type stays registered and its counter is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be removed.
    pub fn destroy(&self, type_name: &str) -> CoreResult<bool> {
        let _guard = self.context.lock.acquire()?;
        self.context.ensure_open()?;
        let Some(type_id) = self.context.sequence.find_type_id(type_name) else {
            return Ok(false);
        };
        let destroyed = self.context.catalog.destroy(&self.table_name(type_id))?;
        if destroyed {
            tracing::info!(type_name, "destroyed entity table");
        }
        Ok(destroyed)
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("group", &self.context.config.group)
            .finish_non_exhaustive()
    }
}

/// Iterator over the entities of one type.
#[derive(Debug)]
pub struct EntityCursor {
    inner: Option<TableCursor>,
    type_name: Arc<str>,
}

impl Iterator for EntityCursor {
    type Item = CoreResult<(Key, Versioned)>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.as_mut()?.next()?;
        Some(item.and_then(|(row_key, row)| {
            let id = crate::key::ResolvedKey::from_bytes(&row_key)
                .and_then(|key| key.id())
                .ok_or_else(|| CoreError::table_corruption(ENTITY_STORE, "malformed entity key"))?;
            Ok((Key::from_parts(Arc::clone(&self.type_name), id), row))
        }))
    }
}
