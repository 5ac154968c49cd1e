//! Persistent key-value cache.
//!
//! `PersistentCache` keeps an in-memory mirror in front of a durable store
//! and flushes writes in batches. Entries are persisted as
//! `{"ts": <ms>, ...payload}` and never expire on their own; callers decide
//! freshness with [`CacheEntry::is_fresh`].
//!
//! Durable backends:
//! - `FileStore`: one JSON file per key, written atomically
//! - `MemoryStore`: session scope and tests

pub mod cleanup;
pub mod keys;
pub mod manager;
pub mod scheduler;
pub mod store;

pub use cleanup::{cleanup_caches, CleanupReport};
pub use manager::{CacheEntry, PersistentCache};
pub use scheduler::{DeferredScheduler, FlushScheduler, FlushTask, ManualScheduler};
pub use store::{DurableStore, FileStore, MemoryStore, StorageError};
