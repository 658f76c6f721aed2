//! Versioned key-value tables.
//!
//! Each physical table is an append-only log of records over one
//! [`StorageBackend`](recordb_storage::StorageBackend), with an in-memory
//! ordered index of live keys. Journal partitions, partition metadata,
//! sequence counters and entity types each get their own table.

mod catalog;
mod record;
mod store;

pub use catalog::{table_name, TableCatalog};
pub use record::{compute_crc32, TableRecord};
pub use store::{ScanOptions, Table, TableCursor};
