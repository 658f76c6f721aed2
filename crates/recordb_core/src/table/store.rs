//! Log-structured versioned key-value table.

use crate::error::{CoreError, CoreResult};
use crate::table::record::TableRecord;
use crate::types::{SortDirection, Versioned};
use parking_lot::RwLock;
use recordb_storage::StorageBackend;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// Position and version of a row's latest record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    offset: u64,
    len: usize,
    version: u64,
}

struct TableInner {
    backend: Box<dyn StorageBackend>,
    index: BTreeMap<Vec<u8>, Slot>,
}

/// A versioned key-value table over one byte store.
///
/// Every write appends a record; an ordered in-memory index maps each live
/// key to its latest record and is rebuilt by scanning the log on open.
/// Rows are ordered bytewise by key.
pub struct Table {
    name: String,
    sync_on_write: bool,
    inner: RwLock<TableInner>,
}

/// Paging options for [`Table::scan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanOptions {
    /// Iteration order.
    pub direction: SortDirection,
    /// Rows to skip from the start of the chosen order.
    pub offset: u64,
    /// Maximum rows to return. `None` means unbounded.
    pub limit: Option<u64>,
}

impl ScanOptions {
    /// Creates options for an unbounded scan in `direction`.
    #[must_use]
    pub const fn new(direction: SortDirection) -> Self {
        Self {
            direction,
            offset: 0,
            limit: None,
        }
    }

    /// Sets the number of rows to skip.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Sets the maximum number of rows.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl Table {
    /// Opens a table over `backend`, rebuilding its index.
    ///
    /// A torn record at the end of the log (left by a crash mid-append) is
    /// cut off so later appends start on a record boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if a complete record in the middle of the log is
    /// damaged, or on I/O failure.
    pub fn open(
        name: impl Into<String>,
        mut backend: Box<dyn StorageBackend>,
        sync_on_write: bool,
    ) -> CoreResult<Self> {
        let name = name.into();
        let index = Self::rebuild_index(&name, backend.as_mut())?;
        Ok(Self {
            name,
            sync_on_write,
            inner: RwLock::new(TableInner { backend, index }),
        })
    }

    fn rebuild_index(
        name: &str,
        backend: &mut dyn StorageBackend,
    ) -> CoreResult<BTreeMap<Vec<u8>, Slot>> {
        let size = backend.size()?;
        let mut index = BTreeMap::new();
        let mut offset = 0u64;

        while offset < size {
            if offset + 4 > size {
                break;
            }
            let prefix = backend.read_at(offset, 4)?;
            let len = TableRecord::peek_len([prefix[0], prefix[1], prefix[2], prefix[3]]);
            if len < TableRecord::HEADER_SIZE + TableRecord::CRC_SIZE
                || offset + len as u64 > size
            {
                break;
            }

            let data = backend.read_at(offset, len)?;
            let record = match TableRecord::decode(name, &data) {
                Ok(record) => record,
                // Only the final record may be torn.
                Err(CoreError::ChecksumMismatch { .. }) if offset + len as u64 == size => break,
                Err(e) => return Err(e),
            };

            if record.tombstone {
                index.remove(&record.key);
            } else {
                index.insert(
                    record.key,
                    Slot {
                        offset,
                        len,
                        version: record.version,
                    },
                );
            }
            offset += len as u64;
        }

        if offset < size {
            tracing::warn!(
                table = name,
                valid_bytes = offset,
                size,
                "discarding torn tail of table log"
            );
            backend.truncate(offset)?;
        }
        Ok(index)
    }

    /// Returns the physical table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_slot(&self, inner: &TableInner, slot: Slot) -> CoreResult<TableRecord> {
        let data = inner.backend.read_at(slot.offset, slot.len)?;
        TableRecord::decode(&self.name, &data)
    }

    fn write(&self, inner: &mut TableInner, record: TableRecord) -> CoreResult<u64> {
        let encoded = record.encode()?;
        let offset = inner.backend.append(&encoded)?;
        if self.sync_on_write {
            inner.backend.sync()?;
        } else {
            inner.backend.flush()?;
        }

        let version = record.version;
        if record.tombstone {
            inner.index.remove(&record.key);
        } else {
            inner.index.insert(
                record.key,
                Slot {
                    offset,
                    len: encoded.len(),
                    version,
                },
            );
        }
        Ok(version)
    }

    /// Returns the latest value of `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<Versioned>> {
        let inner = self.inner.read();
        let Some(&slot) = inner.index.get(key) else {
            return Ok(None);
        };
        let record = self.read_slot(&inner, slot)?;
        Ok(Some(Versioned {
            version: slot.version,
            value: record.payload,
        }))
    }

    /// Returns whether `key` holds a live row.
    #[must_use]
    pub fn contains(&self, key: &[u8]) -> bool {
        self.inner.read().index.contains_key(key)
    }

    /// Creates a row. Returns its version (always 1).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] if the key already exists.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> CoreResult<u64> {
        let mut inner = self.inner.write();
        if inner.index.contains_key(key) {
            return Err(CoreError::illegal_state(format!(
                "key already exists in table {}",
                self.name
            )));
        }
        self.write(&mut inner, TableRecord::put(key.to_vec(), 1, value.to_vec()))
    }

    /// Creates or replaces a row. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn put(&self, key: &[u8], value: &[u8]) -> CoreResult<u64> {
        let mut inner = self.inner.write();
        let version = inner.index.get(key).map_or(1, |slot| slot.version + 1);
        self.write(&mut inner, TableRecord::put(key.to_vec(), version, value.to_vec()))
    }

    /// Replaces an existing row, optionally checking its version.
    ///
    /// Returns `false` if the row does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionConflict`] if `expected_version` is given
    /// and differs from the stored version.
    pub fn update(
        &self,
        key: &[u8],
        value: &[u8],
        expected_version: Option<u64>,
    ) -> CoreResult<bool> {
        let mut inner = self.inner.write();
        let Some(&slot) = inner.index.get(key) else {
            return Ok(false);
        };
        if let Some(expected) = expected_version {
            if expected != slot.version {
                return Err(CoreError::VersionConflict {
                    expected,
                    actual: slot.version,
                });
            }
        }
        self.write(
            &mut inner,
            TableRecord::put(key.to_vec(), slot.version + 1, value.to_vec()),
        )?;
        Ok(true)
    }

    /// Deletes a row. Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn delete(&self, key: &[u8]) -> CoreResult<bool> {
        let mut inner = self.inner.write();
        let Some(&slot) = inner.index.get(key) else {
            return Ok(false);
        };
        self.write(
            &mut inner,
            TableRecord::tombstone(key.to_vec(), slot.version + 1),
        )?;
        Ok(true)
    }

    /// Number of live rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    /// Returns whether the table has no live rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().index.is_empty()
    }

    /// Highest live key.
    #[must_use]
    pub fn last_key(&self) -> Option<Vec<u8>> {
        self.inner.read().index.keys().next_back().cloned()
    }

    /// Opens a cursor over the rows selected by `options`.
    ///
    /// The set of keys is fixed when the cursor is created; values are read
    /// as the cursor advances, and rows deleted in between are skipped.
    #[must_use]
    pub fn scan(self: &Arc<Self>, options: ScanOptions) -> TableCursor {
        let keys = page(self.inner.read().index.keys(), options);
        self.cursor(keys)
    }

    /// Like [`scan`](Self::scan), restricted to keys in `start..=end`.
    ///
    /// Offset and limit count rows inside the range.
    #[must_use]
    pub fn scan_range(self: &Arc<Self>, start: &[u8], end: &[u8], options: ScanOptions) -> TableCursor {
        if start > end {
            return self.cursor(Vec::new());
        }
        let inner = self.inner.read();
        let range = inner
            .index
            .range::<[u8], _>((Bound::Included(start), Bound::Included(end)))
            .map(|(key, _)| key);
        let keys = page(range, options);
        self.cursor(keys)
    }

    fn cursor(self: &Arc<Self>, keys: Vec<Vec<u8>>) -> TableCursor {
        TableCursor {
            table: Arc::clone(self),
            keys: keys.into_iter(),
        }
    }

    /// Drops every row and truncates the log.
    ///
    /// # Errors
    ///
    /// Returns an error if truncation fails.
    pub fn clear(&self) -> CoreResult<()> {
        let mut inner = self.inner.write();
        inner.backend.truncate(0)?;
        inner.index.clear();
        Ok(())
    }

    /// Makes all written rows durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.inner.write().backend.sync()?;
        Ok(())
    }
}

fn page<'a>(keys: impl DoubleEndedIterator<Item = &'a Vec<u8>>, options: ScanOptions) -> Vec<Vec<u8>> {
    let skip = usize::try_from(options.offset).unwrap_or(usize::MAX);
    let take = options
        .limit
        .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    match options.direction {
        SortDirection::Ascending => keys.skip(skip).take(take).cloned().collect(),
        SortDirection::Descending => keys.rev().skip(skip).take(take).cloned().collect(),
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Lazy cursor returned by [`Table::scan`].
pub struct TableCursor {
    table: Arc<Table>,
    keys: std::vec::IntoIter<Vec<u8>>,
}

impl TableCursor {
    /// Rows not yet visited (upper bound; deleted rows are skipped).
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

impl Iterator for TableCursor {
    type Item = CoreResult<(Vec<u8>, Versioned)>;

    fn next(&mut self) -> Option<Self::Item> {
        for key in self.keys.by_ref() {
            match self.table.get(&key) {
                Ok(Some(row)) => return Some(Ok((key, row))),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

impl std::fmt::Debug for TableCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCursor")
            .field("table", &self.table.name())
            .field("remaining", &self.remaining())
            .finish()
    }
}
