//! Persistence boundary for orders, instances and the audit log.
//!
//! Rows are written one at a time; there are no multi-row transactions. Status
//! changes go through conditional writes so concurrent actors cannot silently
//! overwrite each other.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use r#trait::{InstanceStore, InstanceUpdate, LogStore, OrderStore, Persistence, StoreError};
