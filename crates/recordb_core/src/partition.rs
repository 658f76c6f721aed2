//! Journal partition metadata.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// Live, process-local metadata of one journal partition.
///
/// `min_id` is fixed at creation. `max_id` only grows while the partition
/// is open, and a closed partition never reopens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    partition_id: String,
    min_id: u64,
    max_id: u64,
    size: u64,
    closed: bool,
}

impl PartitionInfo {
    /// Creates an open, empty partition whose first record will be `first_id`.
    #[must_use]
    pub fn new(partition_id: impl Into<String>, first_id: u64) -> Self {
        Self {
            partition_id: partition_id.into(),
            min_id: first_id,
            max_id: first_id,
            size: 0,
            closed: false,
        }
    }

    /// Rebuilds the live form of a persisted snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: PartitionSnapshot) -> Self {
        Self {
            partition_id: snapshot.partition_id,
            min_id: snapshot.min_id,
            max_id: snapshot.max_id,
            size: snapshot.size,
            closed: snapshot.closed,
        }
    }

    /// Rendered key of the partition.
    #[must_use]
    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    /// Smallest record id.
    #[must_use]
    pub const fn min_id(&self) -> u64 {
        self.min_id
    }

    /// Largest record id.
    #[must_use]
    pub const fn max_id(&self) -> u64 {
        self.max_id
    }

    /// Number of records.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Whether the partition is closed to appends.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether the partition has reached `capacity` records.
    #[must_use]
    pub const fn is_full(&self, capacity: u64) -> bool {
        self.size >= capacity
    }

    /// Accounts for a record with id `id` written to the partition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IllegalState`] if the partition is closed and
    /// [`CoreError::InvalidArgument`] if `id` would move a boundary backwards.
    pub fn record(&mut self, id: u64) -> CoreResult<()> {
        if self.closed {
            return Err(CoreError::illegal_state(format!(
                "partition {} is closed",
                self.partition_id
            )));
        }
        if id < self.min_id || (self.size > 0 && id <= self.max_id) {
            return Err(CoreError::invalid_argument(format!(
                "id {id} does not follow partition range {}..={}",
                self.min_id, self.max_id
            )));
        }
        self.max_id = id;
        self.size += 1;
        Ok(())
    }

    /// Closes the partition. Closing twice is harmless.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Immutable copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> PartitionSnapshot {
        PartitionSnapshot {
            partition_id: self.partition_id.clone(),
            min_id: self.min_id,
            max_id: self.max_id,
            size: self.size,
            closed: self.closed,
        }
    }
}

/// Point-in-time copy of a partition's metadata.
///
/// This is also the persisted form of a metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    /// Rendered key of the partition.
    pub partition_id: String,
    /// Smallest record id.
    pub min_id: u64,
    /// Largest record id.
    pub max_id: u64,
    /// Number of records.
    pub size: u64,
    /// Whether the partition is closed.
    pub closed: bool,
}

impl PartitionSnapshot {
    /// Whether any id of `start..=end` falls inside the partition.
    #[must_use]
    pub const fn intersects(&self, start: u64, end: u64) -> bool {
        self.size > 0 && self.min_id <= end && self.max_id >= start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_partition_is_open_and_empty() {
        let info = PartitionInfo::new("p", 7);
        assert_eq!(info.min_id(), 7);
        assert_eq!(info.max_id(), 7);
        assert_eq!(info.size(), 0);
        assert!(!info.is_closed());
    }

    #[test]
    fn record_tracks_range() {
        let mut info = PartitionInfo::new("p", 7);
        for id in 7..=9 {
            info.record(id).unwrap();
        }
        assert_eq!(info.max_id(), 9);
        assert_eq!(info.size(), 3);
        assert_eq!(info.size(), 1 + info.max_id() - info.min_id());
        assert!(info.is_full(3));
        assert!(!info.is_full(4));
    }

    #[test]
    fn record_rejects_backwards_ids() {
        let mut info = PartitionInfo::new("p", 7);
        assert!(info.record(6).is_err());
        info.record(7).unwrap();
        assert!(matches!(
            info.record(7),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn closed_partition_refuses_records() {
        let mut info = PartitionInfo::new("p", 1);
        info.record(1).unwrap();
        info.close();
        info.close();
        assert!(matches!(
            info.record(2),
            Err(CoreError::IllegalState { .. })
        ));
        assert!(info.snapshot().closed);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut info = PartitionInfo::new("p", 1);
        info.record(1).unwrap();
        let snapshot = info.snapshot();
        info.record(2).unwrap();
        assert_eq!(snapshot.size, 1);
        assert_eq!(PartitionInfo::from_snapshot(snapshot.clone()).snapshot(), snapshot);
    }

    #[test]
    fn intersection() {
        let mut info = PartitionInfo::new("p", 11);
        assert!(!info.snapshot().intersects(0, 100));
        for id in 11..=20 {
            info.record(id).unwrap();
        }
        let s = info.snapshot();
        assert!(s.intersects(20, 30));
        assert!(s.intersects(1, 11));
        assert!(!s.intersects(21, 30));
        assert!(!s.intersects(1, 10));
    }
}
