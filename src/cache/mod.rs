//! Local persistence for the billing client.
//!
//! This module provides the storage side of the client cache:
//! - A small synchronous key-value trait with SQLite, memory and no-op backends
//! - A scoped view that namespaces keys per app identity
//! - JSON helpers for persisting structured values such as the product cache

mod scoped;
mod storage;

pub use scoped::{keys, ScopedStore};
pub use storage::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
