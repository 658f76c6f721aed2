//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;

/// Strategy for generating valid type names.
pub fn type_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_.]{0,23}").expect("Invalid regex")
}

/// Strategy for generating record payloads (arbitrary bytes).
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for generating partition capacities small enough to force
/// frequent rotation.
pub fn capacity_strategy() -> impl Strategy<Value = u64> {
    1u64..16
}

/// An operation against a journal.
#[derive(Debug, Clone)]
pub enum JournalOperation {
    /// Append a record
    Append {
        /// Record payload
        data: Vec<u8>,
    },
    /// Close the active partition
    CloseActive,
    /// Drop the oldest closed partition
    DropOldest,
}

/// Strategy for generating journal operations.
pub fn journal_operation_strategy() -> impl Strategy<Value = JournalOperation> {
    prop_oneof![
        8 => payload_strategy().prop_map(|data| JournalOperation::Append { data }),
        1 => Just(JournalOperation::CloseActive),
        1 => Just(JournalOperation::DropOldest),
    ]
}

/// Strategy for generating a sequence of journal operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<JournalOperation>> {
    prop::collection::vec(journal_operation_strategy(), min_ops..max_ops)
}

/// A paging request: `(offset, limit)`.
pub fn page_strategy(max_offset: u64) -> impl Strategy<Value = (u64, Option<u64>)> {
    (0..=max_offset, prop::option::of(0u64..64))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 500,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recordb_core::validate_type_name;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn type_names_are_valid(name in type_name_strategy()) {
            prop_assert!(validate_type_name(&name).is_ok());
        }

        #[test]
        fn pages_stay_in_bounds((offset, limit) in page_strategy(50)) {
            prop_assert!(offset <= 50);
            prop_assert!(limit.map_or(true, |l| l < 64));
        }
    }
}
