//! Provides the size constrained LRU cache which backs each group.
//!
//! An LRU cache drops the least recently used entry if it is about to grow beyond its memory
//! budget. The budget is expressed in bytes and covers the length of each key plus the size of
//! its value as reported by the [ByteSize] trait. Note that this is an accounting policy rather
//! than a measurement of the actual heap usage.
//!
//! [LRUCache] itself is a plain single threaded data structure. [SyncedCache] wraps it into a
//! mutex and is the unit actually owned by a [Group](crate::group::Group).
mod lru_cache;
pub mod synced;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionCallback;
pub use lru_cache::LRUCache;
pub use synced::CacheStats;
pub use synced::SyncedCache;
