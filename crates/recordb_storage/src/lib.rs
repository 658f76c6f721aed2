//! # recordb Storage
//!
//! Byte-store backends and named table providers for recordb.
//!
//! Backends are **opaque byte stores**: they append, read and truncate raw
//! bytes and know nothing about the record format layered on top. A
//! [`StorageProvider`] hands out one backend per *physical table name*, so the
//! engine can create, enumerate and destroy tables (journal partitions,
//! metadata, sequence counters) independently.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] / [`InMemoryProvider`] - For testing and ephemeral stores
//! - [`FileBackend`] / [`DirectoryProvider`] - One file per table under a locked directory
//!
//! ## Example
//!
//! ```rust
//! use recordb_storage::{InMemoryProvider, StorageBackend, StorageProvider};
//!
//! let provider = InMemoryProvider::new();
//! let mut table = provider.open("demo.events.p1").unwrap();
//! let offset = table.append(b"hello world").unwrap();
//! assert_eq!(table.read_at(offset, 5).unwrap(), b"hello");
//! assert!(provider.exists("demo.events.p1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod provider;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use provider::{validate_table_name, DirectoryProvider, InMemoryProvider, StorageProvider};
