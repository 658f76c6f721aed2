//! # recordb Core
//!
//! Core engine for recordb, an embeddable record store.
//!
//! This crate provides:
//! - Opaque entity keys and their internal resolved form
//! - A block-reserving sequence allocator with a persistent type registry
//! - Versioned key-value tables over `recordb_storage` byte stores
//! - Partitioned append-only journals with absolute and relative addressing
//! - A typed entity store and the [`RecordStore`] facade that ties them together
//!
//! ## Example
//!
//! ```rust
//! use recordb_core::{Config, RecordStore, SortDirection};
//!
//! let store = RecordStore::open_in_memory(Config::default()).unwrap();
//!
//! let entities = store.entities();
//! let key = entities.create("user", b"alice").unwrap();
//! let external = key.render(store.cipher()).unwrap();
//! assert!(!external.contains("user"));
//!
//! let journal = store.journal("audit", "event").unwrap();
//! journal.append("event", b"login").unwrap();
//! assert_eq!(journal.approximate_size().unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cipher;
mod codec;
mod config;
mod entity;
mod error;
mod journal;
mod key;
mod lock;
mod partition;
mod sequence;
mod store;
mod table;
mod types;

pub use cipher::{EncryptionKey, KeyCipher, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use config::{Config, DEFAULT_BLOCK_SIZE, DEFAULT_PARTITION_CAPACITY};
pub use entity::{EntityCursor, EntityStore};
pub use error::{CoreError, CoreResult};
pub use journal::{ConcatCursor, CursorProvider, JournalCursor, JournalEntry, JournalStore};
pub use key::{validate_type_name, Key, ResolvedKey, KEY_SEPARATOR, MAX_TYPE_NAME_LEN};
pub use lock::{LockGuard, LockManager};
pub use partition::{PartitionInfo, PartitionSnapshot};
pub use sequence::SequenceService;
pub use store::RecordStore;
pub use table::{
    compute_crc32, table_name, ScanOptions, Table, TableCatalog, TableCursor, TableRecord,
};
pub use types::{SortDirection, TypeId, Versioned};
