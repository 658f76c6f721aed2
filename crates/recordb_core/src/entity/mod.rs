//! Typed entity storage.

mod store;

pub use store::{EntityCursor, EntityStore};
