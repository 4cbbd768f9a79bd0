//! Provides a thread safe cache of byte spans.
//!
//! A [SyncedCache] guards an [LRUCache] with a single mutex. As even a lookup modifies the
//! recency order, there is no point in distinguishing between readers and writers. The lock is
//! only held for the duration of an in-memory map operation and never across an await point.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::byte_span::ByteSpan;
use crate::lru::LRUCache;

/// Wraps an [LRUCache] so that it can be shared across threads.
///
/// The underlying cache is only created once it is first used.
pub struct SyncedCache {
    cache_bytes: usize,
    lru: Mutex<Option<LRUCache<ByteSpan>>>,
    evictions: Arc<AtomicUsize>,
}

/// Provides a snapshot of the metrics of a [SyncedCache].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// Contains the number of entries in the cache.
    pub entries: usize,

    /// Contains the number of bytes occupied by all keys and values.
    pub allocated_memory: usize,

    /// Contains the memory budget of the cache (0 = unbounded).
    pub max_memory: usize,

    /// Contains the number of lookups.
    pub reads: usize,

    /// Contains the number of lookups which found a value.
    pub hits: usize,

    /// Contains the number of values added.
    pub writes: usize,

    /// Contains the number of entries evicted to make room.
    pub evictions: usize,
}

impl SyncedCache {
    /// Creates a new cache which will occupy at most **cache_bytes** bytes (0 = unbounded).
    pub fn new(cache_bytes: usize) -> Self {
        SyncedCache {
            cache_bytes,
            lru: Mutex::new(None),
            evictions: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn create_lru(&self) -> LRUCache<ByteSpan> {
        let evictions = self.evictions.clone();
        LRUCache::new(self.cache_bytes).on_evicted(move |key, value: ByteSpan| {
            let _ = evictions.fetch_add(1, Ordering::Relaxed);
            log::debug!("Evicted {} ({} bytes) from cache.", key, value.len());
        })
    }

    /// Returns the value stored for the given key (if present).
    pub fn get(&self, key: &str) -> Option<ByteSpan> {
        let mut lru = self.lru.lock().unwrap();
        lru.get_or_insert_with(|| self.create_lru())
            .get(key)
            .cloned()
    }

    /// Stores the given value for the given key.
    pub fn add(&self, key: &str, value: ByteSpan) {
        let mut lru = self.lru.lock().unwrap();
        lru.get_or_insert_with(|| self.create_lru())
            .put(key.to_owned(), value);
    }

    /// Returns the current metrics of this cache.
    pub fn stats(&self) -> CacheStats {
        let lru = self.lru.lock().unwrap();
        match lru.as_ref() {
            Some(lru) => CacheStats {
                entries: lru.len(),
                allocated_memory: lru.allocated_memory(),
                max_memory: lru.max_memory(),
                reads: lru.reads(),
                hits: lru.hits(),
                writes: lru.writes(),
                evictions: self.evictions.load(Ordering::Relaxed),
            },
            None => CacheStats {
                max_memory: self.cache_bytes,
                ..CacheStats::default()
            },
        }
    }
}
