//! Persistent caching of fetched collections.
//!
//! This module provides:
//! - `ResourceKey`, the `(subject, kind, parent)` identity of a collection
//! - `PersistentCache`, a string key/value contract for serialized collections
//! - SQLite, in-memory and no-op backends

mod key;
mod storage;

pub use key::{ResourceKey, ResourceKind};
pub use storage::{MemoryCache, NoopCache, PersistentCache, SqliteCache};
