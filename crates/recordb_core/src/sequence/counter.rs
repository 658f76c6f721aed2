//! In-memory reservation window for one type.

use crate::error::{CoreError, CoreResult};
use crate::types::TypeId;

/// A block of ids reserved in storage and served from memory.
///
/// Ids `base..max` belong to this process; `base + offset` is the next one
/// to hand out. Once it reaches `max` the counter is exhausted and must be
/// replaced by a fresh reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Counter {
    type_id: TypeId,
    base: u64,
    max: u64,
    offset: u64,
}

impl Counter {
    /// Reserves the block following `high_water`.
    ///
    /// Returns the counter and the high-water mark to persist.
    pub(crate) fn reserve(type_id: TypeId, high_water: u64, block_size: u64) -> CoreResult<(Self, u64)> {
        let exhausted = || CoreError::allocation(format!("id space exhausted for {type_id}"));
        let new_high_water = high_water.checked_add(block_size).ok_or_else(exhausted)?;
        let max = new_high_water.checked_add(1).ok_or_else(exhausted)?;
        let counter = Self {
            type_id,
            base: high_water + 1,
            max,
            offset: 0,
        };
        Ok((counter, new_high_water))
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Next id this counter would issue.
    pub(crate) fn peek(&self) -> u64 {
        self.base + self.offset
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.peek() >= self.max
    }

    /// Issues the next id, or `None` once the block is used up.
    pub(crate) fn take(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }
        let id = self.peek();
        self.offset += 1;
        Some(id)
    }

    /// Moves the window so the next issued id is greater than `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Allocation`] if `id` lies at or beyond the
    /// reserved ceiling; ids there were never reserved.
    pub(crate) fn bump_past(&mut self, id: u64) -> CoreResult<()> {
        if id >= self.max {
            return Err(CoreError::allocation(format!(
                "cannot bump {} to {id}: reserved block ends at {}",
                self.type_id,
                self.max - 1
            )));
        }
        if id >= self.peek() {
            self.offset = id + 1 - self.base;
        }
        Ok(())
    }

    /// Highest id issued so far (the value to persist at shutdown).
    pub(crate) fn position(&self) -> u64 {
        self.peek() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: TypeId = TypeId::new(1);

    #[test]
    fn reserve_starts_after_high_water() {
        let (counter, persisted) = Counter::reserve(T, 0, 3).unwrap();
        assert_eq!(persisted, 3);
        assert_eq!(counter.peek(), 1);
        assert_eq!(counter.position(), 0);
    }

    #[test]
    fn take_until_exhausted() {
        let (mut counter, _) = Counter::reserve(T, 10, 3).unwrap();
        assert_eq!(counter.take(), Some(11));
        assert_eq!(counter.take(), Some(12));
        assert_eq!(counter.take(), Some(13));
        assert!(counter.is_exhausted());
        assert_eq!(counter.take(), None);
        assert_eq!(counter.position(), 13);
    }

    #[test]
    fn bump_moves_forward_only() {
        let (mut counter, _) = Counter::reserve(T, 0, 10).unwrap();
        counter.bump_past(5).unwrap();
        assert_eq!(counter.peek(), 6);
        counter.bump_past(2).unwrap();
        assert_eq!(counter.peek(), 6);
        counter.bump_past(10).unwrap();
        assert!(counter.is_exhausted());
    }

    #[test]
    fn bump_past_ceiling_fails() {
        let (mut counter, _) = Counter::reserve(T, 0, 10).unwrap();
        assert!(matches!(
            counter.bump_past(11),
            Err(CoreError::Allocation { .. })
        ));
        assert_eq!(counter.peek(), 1);
    }

    #[test]
    fn reserve_overflow_is_allocation_error() {
        assert!(Counter::reserve(T, u64::MAX - 1, 10).is_err());
    }

    #[test]
    fn block_ending_at_last_id_is_rejected() {
        assert!(matches!(
            Counter::reserve(T, u64::MAX - 10, 10),
            Err(CoreError::Allocation { .. })
        ));
        let (counter, persisted) = Counter::reserve(T, u64::MAX - 11, 10).unwrap();
        assert_eq!(persisted, u64::MAX - 1);
        assert_eq!(counter.peek(), u64::MAX - 10);
    }
}
