//! Partitioned append-only journals.
//!
//! A journal shards an unbounded stream of records into bounded partitions
//! that can be closed and dropped independently. Records are addressed
//! either by absolute position in the type's id space or by relative
//! position among the records still retained.

mod iter;
mod store;

pub use iter::{ConcatCursor, CursorProvider};
pub use store::{JournalCursor, JournalEntry, JournalStore};
