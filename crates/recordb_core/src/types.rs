//! Core type definitions for recordb.

use std::fmt;

/// Stable integer tag standing in for a type name.
///
/// Tags are handed out by the sequence service's type registry and never
/// change for the lifetime of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Creates a type id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw tag.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type:{}", self.0)
    }
}

/// Iteration order for scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Lowest key first.
    #[default]
    Ascending,
    /// Highest key first.
    Descending,
}

impl SortDirection {
    /// Returns the opposite direction.
    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

/// A stored value together with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// Version, starting at 1 and bumped on every update.
    pub version: u64,
    /// Opaque payload.
    pub value: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_id_display() {
        assert_eq!(format!("{}", TypeId::new(7)), "type:7");
    }

    #[test]
    fn direction_reverse() {
        assert_eq!(SortDirection::Ascending.reverse(), SortDirection::Descending);
        assert_eq!(SortDirection::default(), SortDirection::Ascending);
    }
}
