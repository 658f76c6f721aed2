//! Per-type id allocation.
//!
//! The [`SequenceService`] owns the type registry (name to integer tag) and
//! one reservation window per type. Both live in tables of the same catalog
//! as the data they number.

mod counter;
mod service;

pub use service::SequenceService;
