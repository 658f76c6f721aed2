//! Partitioned append-only journal.

use crate::codec::{from_cbor, to_cbor};
use crate::error::{CoreError, CoreResult};
use crate::journal::iter::{ConcatCursor, CursorProvider};
use crate::key::{validate_type_name, Key, ResolvedKey};
use crate::lock::LockManager;
use crate::partition::{PartitionInfo, PartitionSnapshot};
use crate::store::StoreContext;
use crate::table::{table_name, ScanOptions, Table, TableCursor};
use crate::types::{SortDirection, TypeId};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// One record read back from a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Key issued when the record was appended.
    pub key: Key,
    /// The stored payload.
    pub value: Vec<u8>,
}

/// The partition currently receiving appends.
struct ActivePartition {
    id: u64,
    row_key: [u8; ResolvedKey::ENCODED_LEN],
    table: Arc<Table>,
    info: Mutex<PartitionInfo>,
}

/// An unbounded append-only stream of records, stored as a series of
/// bounded partitions.
///
/// Every partition is its own physical table and moves through
/// `OPEN -> CLOSED -> DROPPED`. At most one partition is open; it becomes
/// closed when it reaches the configured capacity or on
/// [`close_active_partition`](Self::close_active_partition), and only closed
/// partitions can be dropped.
///
/// Mutations serialize on the store-wide lock. Reads never take it: range
/// queries plan against the committed partition metadata and open each
/// partition's cursor only when iteration reaches it.
pub struct JournalStore {
    context: Arc<StoreContext>,
    name: String,
    data_type: Arc<str>,
    data_type_id: TypeId,
    partition_type: String,
    partition_type_id: TypeId,
    metadata: Arc<Table>,
    active: RwLock<Option<Arc<ActivePartition>>>,
    clear_lock: LockManager,
}

impl JournalStore {
    pub(crate) fn new(context: Arc<StoreContext>, name: &str, data_type: &str) -> CoreResult<Self> {
        recordb_storage::validate_table_name(name)
            .map_err(|_| CoreError::invalid_argument(format!("invalid journal name {name:?}")))?;
        validate_type_name(name)?;
        validate_type_name(data_type)?;

        let partition_type = format!("{name}.partition");
        let data_type_id = context.sequence.register_type(data_type)?;
        let partition_type_id = context.sequence.register_type(&partition_type)?;
        let metadata = context
            .catalog
            .open(&table_name(&context.config.group, name, "meta"))?;
        let clear_lock = LockManager::new("clear", context.config.lock_timeout);

        Ok(Self {
            context,
            name: name.to_string(),
            data_type: Arc::from(data_type),
            data_type_id,
            partition_type,
            partition_type_id,
            metadata,
            active: RwLock::new(None),
            clear_lock,
        })
    }

    /// Journal name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type of the records this journal accepts.
    #[must_use]
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    fn partition_table(&self, partition: u64) -> String {
        table_name(&self.context.config.group, &self.name, &format!("p{partition}"))
    }

    fn check_type(&self, data_type: &str) -> CoreResult<()> {
        if data_type == &*self.data_type {
            Ok(())
        } else {
            Err(CoreError::invalid_argument(format!(
                "journal {} holds {}, not {data_type}",
                self.name, self.data_type
            )))
        }
    }

    fn current(&self) -> Option<Arc<ActivePartition>> {
        self.active.read().clone()
    }

    fn write_metadata(&self, row_key: &[u8], snapshot: &PartitionSnapshot) -> CoreResult<()> {
        self.metadata.put(row_key, &to_cbor(snapshot)?)?;
        Ok(())
    }

    /// Committed partition metadata with numeric partition ids, in creation
    /// order.
    fn partitions(&self) -> CoreResult<Vec<(u64, PartitionSnapshot)>> {
        self.metadata
            .scan(ScanOptions::default())
            .map(|row| {
                let (row_key, row) = row?;
                Ok((self.partition_number(&row_key)?, from_cbor(&row.value)?))
            })
            .collect()
    }

    fn partition_number(&self, row_key: &[u8]) -> CoreResult<u64> {
        ResolvedKey::from_bytes(row_key)
            .filter(|key| key.type_id == self.partition_type_id)
            .and_then(|key| key.id())
            .ok_or_else(|| CoreError::table_corruption(self.metadata.name(), "malformed partition row key"))
    }

    fn record_key(&self, id: u64) -> [u8; ResolvedKey::ENCODED_LEN] {
        ResolvedKey::new(self.data_type_id, id).to_bytes()
    }

    /// Recovers the active partition from persisted metadata.
    ///
    /// If the most recently created partition is still open it becomes the
    /// active partition again. Records written to it after its metadata was
    /// last persisted are folded back into the metadata, and a partition
    /// that turns out to be full is closed. Running it again yields the same
    /// state.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata or the partition table cannot be read.
    pub fn initialize(&self) -> CoreResult<()> {
        let _guard = self.context.lock.acquire()?;
        *self.active.write() = None;

        let last = self
            .metadata
            .scan(ScanOptions::new(SortDirection::Descending).limit(1))
            .next()
            .transpose()?;
        let Some((row_key, row)) = last else {
            tracing::debug!(journal = %self.name, "no partitions to recover");
            return Ok(());
        };
        let snapshot: PartitionSnapshot = from_cbor(&row.value)?;
        if snapshot.closed {
            return Ok(());
        }

        let id = self.partition_number(&row_key)?;
        let table = self.context.catalog.open(&self.partition_table(id))?;
        let mut info = PartitionInfo::from_snapshot(snapshot);
        let orphans = self.reconcile(&table, &mut info)?;
        if orphans > 0 {
            tracing::warn!(
                journal = %self.name,
                partition = id,
                orphans,
                max_id = info.max_id(),
                "recovered records missing from partition metadata"
            );
            self.write_metadata(&row_key, &info.snapshot())?;
        }

        let full = info.is_full(self.context.config.partition_capacity);
        let mut key = [0u8; ResolvedKey::ENCODED_LEN];
        key.copy_from_slice(&row_key);
        *self.active.write() = Some(Arc::new(ActivePartition {
            id,
            row_key: key,
            table,
            info: Mutex::new(info),
        }));
        tracing::debug!(journal = %self.name, partition = id, "reopened active partition");

        if full {
            self.close_active_partition()?;
        }
        Ok(())
    }

    /// Accounts for rows the table holds beyond the metadata's `max_id`.
    fn reconcile(&self, table: &Arc<Table>, info: &mut PartitionInfo) -> CoreResult<u64> {
        let from = if info.size() == 0 {
            info.min_id()
        } else {
            info.max_id().saturating_add(1)
        };
        let mut found = 0;
        for row in table.scan_range(&self.record_key(from), &self.record_key(u64::MAX), ScanOptions::default()) {
            let (row_key, _) = row?;
            let id = ResolvedKey::from_bytes(&row_key)
                .and_then(|key| key.id())
                .ok_or_else(|| CoreError::table_corruption(table.name(), "malformed record key"))?;
            info.record(id)?;
            found += 1;
        }
        Ok(found)
    }

    /// Appends `value` and returns the key it was stored under.
    ///
    /// Rotates to a new partition when there is no open one, and closes the
    /// partition once it reaches capacity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `data_type` is not the
    /// journal's type, [`CoreError::Allocation`] if a record or partition id
    /// cannot be issued, and [`CoreError::IllegalState`] if the store is
    /// closed.
    pub fn append(&self, data_type: &str, value: &[u8]) -> CoreResult<Key> {
        self.check_type(data_type)?;
        let _guard = self.context.lock.acquire()?;
        self.context.ensure_open()?;

        let key = self.context.sequence.next_key(&self.data_type)?;
        let active = match self.current() {
            Some(active) => active,
            None => self.open_partition(key.id())?,
        };

        active.table.insert(&self.record_key(key.id()), value)?;
        let snapshot = {
            let mut info = active.info.lock();
            info.record(key.id())?;
            info.snapshot()
        };
        self.write_metadata(&active.row_key, &snapshot)?;

        if snapshot.size >= self.context.config.partition_capacity {
            tracing::info!(
                journal = %self.name,
                partition = active.id,
                size = snapshot.size,
                "partition full, rotating"
            );
            self.close_active_partition()?;
        }
        Ok(key)
    }

    fn open_partition(&self, first_id: u64) -> CoreResult<Arc<ActivePartition>> {
        let key = self.context.sequence.next_key(&self.partition_type)?;
        let row_key = ResolvedKey::new(self.partition_type_id, key.id()).to_bytes();
        let info = PartitionInfo::new(key.render(&self.context.cipher)?, first_id);

        let table = self.context.catalog.open(&self.partition_table(key.id()))?;
        if !table.is_empty() {
            tracing::warn!(
                journal = %self.name,
                partition = key.id(),
                rows = table.len(),
                "discarding stale rows of reused partition table"
            );
            table.clear()?;
        }
        self.metadata.insert(&row_key, &to_cbor(&info.snapshot())?)?;

        let active = Arc::new(ActivePartition {
            id: key.id(),
            row_key,
            table,
            info: Mutex::new(info),
        });
        *self.active.write() = Some(Arc::clone(&active));
        tracing::debug!(journal = %self.name, partition = key.id(), first_id, "opened partition");
        Ok(active)
    }

    /// Closes the active partition so the next append starts a new one.
    ///
    /// Returns `false` if there was no active partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the closed state cannot be persisted; the
    /// partition then stays active.
    pub fn close_active_partition(&self) -> CoreResult<bool> {
        let _guard = self.context.lock.acquire()?;
        let Some(active) = self.current() else {
            return Ok(false);
        };

        // Appends hold the store lock too, so the snapshot cannot go stale
        // while the info mutex is released for the I/O below.
        let mut snapshot = active.info.lock().snapshot();
        snapshot.closed = true;
        active.table.sync()?;
        self.write_metadata(&active.row_key, &snapshot)?;
        active.info.lock().close();
        *self.active.write() = None;

        tracing::info!(journal = %self.name, partition = active.id, size = snapshot.size, "closed partition");
        Ok(true)
    }

    /// Drops a closed partition: destroys its table and forgets its metadata.
    ///
    /// Returns `false` if no such partition exists.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidKey`] if `partition_id` is not a rendered
    /// key, [`CoreError::InvalidArgument`] if it names something other than a
    /// partition of this journal, and [`CoreError::IllegalState`] if the
    /// partition is still open.
    pub fn drop_partition(&self, partition_id: &str) -> CoreResult<bool> {
        let key = Key::parse(&self.context.cipher, partition_id)?;
        if key.type_name() != self.partition_type {
            return Err(CoreError::invalid_argument(format!(
                "{partition_id} is not a partition of journal {}",
                self.name
            )));
        }

        let _guard = self.context.lock.acquire()?;
        let row_key = ResolvedKey::new(self.partition_type_id, key.id()).to_bytes();
        let Some(row) = self.metadata.get(&row_key)? else {
            return Ok(false);
        };
        let snapshot: PartitionSnapshot = from_cbor(&row.value)?;
        if !snapshot.closed {
            return Err(CoreError::illegal_state(format!(
                "partition {} of journal {} is still open",
                key.id(),
                self.name
            )));
        }

        self.context.catalog.destroy(&self.partition_table(key.id()))?;
        self.metadata.delete(&row_key)?;
        tracing::info!(journal = %self.name, partition = key.id(), size = snapshot.size, "dropped partition");
        Ok(true)
    }

    /// Removes every partition and restarts both id spaces at 1.
    ///
    /// Concurrent appends observe either the state before or after the whole
    /// clear. Clearing an empty journal is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a partition cannot be dropped or a counter reset.
    pub fn clear(&self) -> CoreResult<()> {
        let _clear = self.clear_lock.acquire()?;
        let _guard = self.context.lock.acquire()?;

        self.close_active_partition()?;
        let partitions = self.all_partitions(SortDirection::Ascending)?;
        for partition in &partitions {
            self.drop_partition(&partition.partition_id)?;
        }
        self.context.sequence.reset_counter(&self.data_type)?;
        self.context.sequence.reset_counter(&self.partition_type)?;
        self.metadata.clear()?;
        self.initialize()?;

        tracing::info!(journal = %self.name, dropped = partitions.len(), "cleared journal");
        Ok(())
    }

    /// Reads records by position in the journal's whole id space.
    ///
    /// Offset `n` addresses the record with id `n + 1`, and `limit` spans ids
    /// rather than records, so ids of dropped partitions are never
    /// renumbered: a range falling into them yields fewer records or none.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a foreign type or
    /// descending order, which absolute addressing does not support.
    pub fn entries_absolute(
        &self,
        data_type: &str,
        direction: SortDirection,
        offset: u64,
        limit: Option<u64>,
    ) -> CoreResult<JournalCursor> {
        self.check_type(data_type)?;
        if direction == SortDirection::Descending {
            return Err(CoreError::invalid_argument(
                "absolute journal iteration only supports ascending order",
            ));
        }

        let Some(start) = offset.checked_add(1) else {
            return Ok(self.cursor(Vec::new()));
        };
        let end = match limit {
            Some(0) => return Ok(self.cursor(Vec::new())),
            Some(limit) => start.saturating_add(limit - 1),
            None => u64::MAX,
        };

        let mut plan = Vec::new();
        for (id, partition) in self.partitions()? {
            if partition.min_id > end {
                break;
            }
            if !partition.intersects(start, end) {
                continue;
            }
            let lo = start.max(partition.min_id);
            let hi = end.min(partition.max_id);
            plan.push(self.provider(id, lo, hi, ScanOptions::default()));
        }
        Ok(self.cursor(plan))
    }

    /// Reads records by position among the records currently retained.
    ///
    /// Offsets shift as partitions are dropped. Both directions are
    /// supported; descending order starts from the newest record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for a foreign type.
    pub fn entries_relative(
        &self,
        data_type: &str,
        direction: SortDirection,
        offset: u64,
        limit: Option<u64>,
    ) -> CoreResult<JournalCursor> {
        self.check_type(data_type)?;

        let mut partitions = self.partitions()?;
        if direction == SortDirection::Descending {
            partitions.reverse();
        }

        let mut skip = offset;
        let mut remaining = limit.unwrap_or(u64::MAX);
        let mut plan = Vec::new();
        for (id, partition) in partitions {
            if remaining == 0 {
                break;
            }
            if skip >= partition.size {
                skip -= partition.size;
                continue;
            }
            let take = (partition.size - skip).min(remaining);
            let options = ScanOptions::new(direction).offset(skip).limit(take);
            plan.push(self.provider(id, partition.min_id, partition.max_id, options));
            remaining -= take;
            skip = 0;
        }
        Ok(self.cursor(plan))
    }

    fn provider(&self, partition: u64, lo: u64, hi: u64, options: ScanOptions) -> CursorProvider {
        let catalog = Arc::clone(&self.context.catalog);
        let table = self.partition_table(partition);
        let start = self.record_key(lo);
        let end = self.record_key(hi);
        Box::new(move || -> CoreResult<Option<TableCursor>> {
            Ok(catalog
                .open_existing(&table)?
                .map(|table| table.scan_range(&start, &end, options)))
        })
    }

    fn cursor(&self, plan: Vec<CursorProvider>) -> JournalCursor {
        JournalCursor {
            inner: ConcatCursor::new(plan),
            data_type: Arc::clone(&self.data_type),
        }
    }

    /// Sums the sizes recorded in partition metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    pub fn approximate_size(&self) -> CoreResult<u64> {
        Ok(self
            .partitions()?
            .iter()
            .map(|(_, partition)| partition.size)
            .sum())
    }

    /// Snapshot of the partition receiving appends, if any.
    #[must_use]
    pub fn active_partition(&self) -> Option<PartitionSnapshot> {
        self.current().map(|active| active.info.lock().snapshot())
    }

    /// Snapshots of every partition in creation order (or its reverse).
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    pub fn all_partitions(&self, direction: SortDirection) -> CoreResult<Vec<PartitionSnapshot>> {
        let mut partitions: Vec<PartitionSnapshot> =
            self.partitions()?.into_iter().map(|(_, p)| p).collect();
        if direction == SortDirection::Descending {
            partitions.reverse();
        }
        Ok(partitions)
    }
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("active", &self.current().map(|active| active.id))
            .finish_non_exhaustive()
    }
}

/// Iterator over journal records, returned by the range queries of
/// [`JournalStore`].
#[derive(Debug)]
pub struct JournalCursor {
    inner: ConcatCursor,
    data_type: Arc<str>,
}

impl JournalCursor {
    /// Number of partitions whose table has been opened so far.
    #[must_use]
    pub fn opened_partitions(&self) -> usize {
        self.inner.opened()
    }

    /// Number of planned partitions not yet reached.
    #[must_use]
    pub fn pending_partitions(&self) -> usize {
        self.inner.pending()
    }

    /// Stops iteration and releases any open partition cursor.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

impl Iterator for JournalCursor {
    type Item = CoreResult<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(item.and_then(|(row_key, row)| {
            let id = ResolvedKey::from_bytes(&row_key)
                .and_then(|key| key.id())
                .ok_or_else(|| CoreError::table_corruption("journal partition", "malformed record key"))?;
            Ok(JournalEntry {
                key: Key::from_parts(Arc::clone(&self.data_type), id),
                value: row.value,
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::RecordStore;

    fn store(capacity: u64) -> RecordStore {
        RecordStore::open_in_memory(Config::default().partition_capacity(capacity)).unwrap()
    }

    fn fill(journal: &JournalStore, n: u64) {
        for i in 0..n {
            journal.append("foo", &i.to_be_bytes()).unwrap();
        }
    }

    fn ids(cursor: JournalCursor) -> Vec<u64> {
        cursor.map(|entry| entry.unwrap().key.id()).collect()
    }

    #[test]
    fn append_issues_increasing_keys() {
        let store = store(10);
        let journal = store.journal("events", "foo").unwrap();
        let a = journal.append("foo", b"a").unwrap();
        let b = journal.append("foo", b"b").unwrap();
        assert_eq!(a.type_name(), "foo");
        assert_eq!((a.id(), b.id()), (1, 2));

        let active = journal.active_partition().unwrap();
        assert_eq!((active.min_id, active.max_id, active.size), (1, 2, 2));
        assert!(!active.closed);
    }

    #[test]
    fn foreign_type_is_rejected() {
        let store = store(10);
        let journal = store.journal("events", "foo").unwrap();
        assert!(matches!(
            journal.append("bar", b"x"),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(journal.active_partition().is_none());
        assert!(journal
            .entries_relative("bar", SortDirection::Ascending, 0, None)
            .is_err());
    }

    #[test]
    fn hundred_records_fill_ten_partitions() {
        let store = store(10);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 100);

        let partitions = journal.all_partitions(SortDirection::Ascending).unwrap();
        assert_eq!(partitions.len(), 10);
        assert!(partitions.iter().all(|p| p.closed && p.size == 10));
        assert!(journal.active_partition().is_none());

        journal.append("foo", b"101").unwrap();
        let active = journal.active_partition().unwrap();
        assert_eq!(active.size, 1);
        assert_eq!(journal.all_partitions(SortDirection::Ascending).unwrap().len(), 11);

        assert!(journal.drop_partition(&partitions[3].partition_id).unwrap());
        assert_eq!(journal.all_partitions(SortDirection::Ascending).unwrap().len(), 10);
        assert!(matches!(
            journal.drop_partition(&active.partition_id),
            Err(CoreError::IllegalState { .. })
        ));
        assert!(!journal.drop_partition(&partitions[3].partition_id).unwrap());
    }

    #[test]
    fn partition_bounds_hold() {
        let store = store(4);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 10);
        for p in journal.all_partitions(SortDirection::Ascending).unwrap() {
            assert!(p.min_id <= p.max_id);
            assert_eq!(p.size, 1 + p.max_id - p.min_id);
        }
        assert_eq!(journal.approximate_size().unwrap(), 10);
    }

    #[test]
    fn absolute_and_relative_agree_without_drops() {
        let store = store(10);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 35);

        for (offset, limit) in [(0, Some(5)), (8, Some(15)), (30, None), (40, Some(3))] {
            let abs = ids(journal.entries_absolute("foo", SortDirection::Ascending, offset, limit).unwrap());
            let rel = ids(journal.entries_relative("foo", SortDirection::Ascending, offset, limit).unwrap());
            assert_eq!(abs, rel, "offset {offset} limit {limit:?}");
        }
    }

    #[test]
    fn addressing_diverges_after_drop() {
        let store = store(10);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 30);
        let first = journal.all_partitions(SortDirection::Ascending).unwrap().remove(0);
        journal.drop_partition(&first.partition_id).unwrap();

        let rel = ids(journal.entries_relative("foo", SortDirection::Ascending, 0, Some(5)).unwrap());
        assert_eq!(rel, vec![11, 12, 13, 14, 15]);

        let abs = ids(journal.entries_absolute("foo", SortDirection::Ascending, 0, Some(5)).unwrap());
        assert!(abs.is_empty());
        let straddling = ids(journal.entries_absolute("foo", SortDirection::Ascending, 5, Some(10)).unwrap());
        assert_eq!(straddling, vec![11, 12, 13, 14, 15]);
    }

    #[test]
    fn relative_descending_crosses_partitions() {
        let store = store(4);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 10);
        let desc = ids(journal.entries_relative("foo", SortDirection::Descending, 1, Some(5)).unwrap());
        assert_eq!(desc, vec![9, 8, 7, 6, 5]);
    }

    #[test]
    fn descending_absolute_is_unsupported() {
        let store = store(4);
        let journal = store.journal("events", "foo").unwrap();
        assert!(matches!(
            journal.entries_absolute("foo", SortDirection::Descending, 0, None),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn queries_open_only_touched_partitions() {
        let store = store(10);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 50);

        let mut cursor = journal.entries_absolute("foo", SortDirection::Ascending, 25, Some(10)).unwrap();
        assert_eq!(cursor.opened_partitions(), 0);
        assert_eq!(cursor.pending_partitions(), 2);
        assert_eq!(cursor.next().unwrap().unwrap().key.id(), 26);
        assert_eq!(cursor.opened_partitions(), 1);
        cursor.close();
        assert!(cursor.next().is_none());

        let cursor = journal.entries_relative("foo", SortDirection::Ascending, 42, None).unwrap();
        assert_eq!(cursor.pending_partitions(), 1);
        assert_eq!(ids(cursor), (43..=50).collect::<Vec<_>>());
    }

    #[test]
    fn values_round_trip() {
        let store = store(3);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 5);
        let values: Vec<Vec<u8>> = journal
            .entries_relative("foo", SortDirection::Ascending, 0, None)
            .unwrap()
            .map(|entry| entry.unwrap().value)
            .collect();
        let expected: Vec<Vec<u8>> = (0u64..5).map(|i| i.to_be_bytes().to_vec()).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn close_active_partition_rotates() {
        let store = store(10);
        let journal = store.journal("events", "foo").unwrap();
        assert!(!journal.close_active_partition().unwrap());

        fill(&journal, 3);
        assert!(journal.close_active_partition().unwrap());
        assert!(journal.active_partition().is_none());

        fill(&journal, 1);
        let partitions = journal.all_partitions(SortDirection::Ascending).unwrap();
        assert_eq!(partitions.len(), 2);
        assert!(partitions[0].closed);
        assert_eq!(partitions[1].min_id, 4);
    }

    #[test]
    fn clear_twice_resets_everything() {
        let store = store(4);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 10);

        for _ in 0..2 {
            journal.clear().unwrap();
            assert!(journal.all_partitions(SortDirection::Ascending).unwrap().is_empty());
            assert!(journal.active_partition().is_none());
            assert_eq!(journal.approximate_size().unwrap(), 0);
            assert_eq!(store.sequence().persisted_high_water("foo").unwrap(), 0);
            assert_eq!(store.sequence().persisted_high_water("events.partition").unwrap(), 0);
        }

        assert_eq!(journal.append("foo", b"again").unwrap().id(), 1);
    }

    #[test]
    fn initialize_recovers_active_partition() {
        let store = store(10);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 3);
        let before = journal.active_partition().unwrap();

        let reopened = store.journal("events", "foo").unwrap();
        assert_eq!(reopened.active_partition().unwrap(), before);
        reopened.initialize().unwrap();
        assert_eq!(reopened.active_partition().unwrap(), before);
    }

    #[test]
    fn initialize_folds_in_orphan_records() {
        let store = store(4);
        let journal = store.journal("events", "foo").unwrap();
        fill(&journal, 2);
        let active = journal.current().unwrap();

        // A record written without its metadata update.
        let orphan = store.sequence().next_key("foo").unwrap();
        active.table.insert(&journal.record_key(orphan.id()), b"orphan").unwrap();

        journal.initialize().unwrap();
        let recovered = journal.active_partition().unwrap();
        assert_eq!((recovered.max_id, recovered.size), (3, 3));
        assert_eq!(journal.approximate_size().unwrap(), 3);

        let orphan = store.sequence().next_key("foo").unwrap();
        journal
            .current()
            .unwrap()
            .table
            .insert(&journal.record_key(orphan.id()), b"orphan")
            .unwrap();
        journal.initialize().unwrap();
        assert!(journal.active_partition().is_none());
        let partitions = journal.all_partitions(SortDirection::Ascending).unwrap();
        assert!(partitions[0].closed);
        assert_eq!(partitions[0].size, 4);
    }

    #[test]
    fn drop_rejects_foreign_ids() {
        let store = store(4);
        let journal = store.journal("events", "foo").unwrap();
        let foreign = Key::new("foo", 1).unwrap().render(store.cipher()).unwrap();
        assert!(matches!(
            journal.drop_partition(&foreign),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            journal.drop_partition("not-a-key"),
            Err(CoreError::InvalidKey { .. })
        ));
    }

    #[test]
    fn concurrent_appends_keep_partitions_consistent() {
        let store = store(7);
        let journal = store.journal("events", "foo").unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let journal = Arc::clone(&journal);
                std::thread::spawn(move || fill(&journal, 25))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let partitions = journal.all_partitions(SortDirection::Ascending).unwrap();
        assert_eq!(partitions.iter().map(|p| p.size).sum::<u64>(), 100);
        assert_eq!(partitions.iter().filter(|p| !p.closed).count(), 1);
        let all = ids(journal.entries_relative("foo", SortDirection::Ascending, 0, None).unwrap());
        assert_eq!(all, (1..=100).collect::<Vec<_>>());
    }
}
