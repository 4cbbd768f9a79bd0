use fnv::FnvHashMap;

/// Returns the accounted size of a value in bytes.
pub trait ByteSize {
    /// Returns the number of bytes this value accounts for.
    ///
    /// Note that this is a policy knob rather than a physical measurement. The cache only sums up
    /// what its values report here (plus the length of their keys) and compares this against its
    /// budget.
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Invoked for each entry which is evicted to make room.
pub type EvictionCallback<V> = Box<dyn FnMut(String, V) + Send>;

/// Provides a size constrained LRU cache.
///
/// A cache behaves just like a **Map** as long as the sum of all keys and values is below the given
/// **max_memory**. Once an insertion pushes the cache beyond this limit, the least recently used
/// entries are evicted until the cache fits again. A **max_memory** of 0 disables the limit.
///
/// Entries live in an arena and are linked via their slot indices, so that promoting an entry
/// or evicting the oldest one is O(1) and doesn't require any pointers. Note that the cache
/// itself performs no locking - see [SyncedCache](crate::lru::SyncedCache) for a thread safe
/// wrapper.
///
/// # Examples
/// ```
/// # use ganymede::lru::LRUCache;
/// // Specifies a cache which can store up to 24 bytes (keys and values)...
/// let mut lru = LRUCache::new(24);
///
/// lru.put("Foo".to_owned(), "Bar".to_owned());
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit..
/// lru.put("Foo1".to_owned(), "X".repeat(8));
/// assert_eq!(lru.get("Foo").is_some(), true);
/// assert_eq!(lru.get("Foo1").is_some(), true);
///
/// // this will hit the max memory constraint...
/// lru.put("Foo2".to_owned(), "X".repeat(16));
/// // ..and therefore will throw the two others out:
/// assert_eq!(lru.get("Foo").is_some(), false);
/// assert_eq!(lru.get("Foo1").is_some(), false);
/// assert_eq!(lru.get("Foo2").is_some(), true);
///```
pub struct LRUCache<V: ByteSize> {
    max_memory: usize,
    allocated_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    slots: Vec<Option<Entry<V>>>,
    free_slots: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: FnvHashMap<String, usize>,
    on_evicted: Option<EvictionCallback<V>>,
}

struct Entry<V> {
    key: String,
    value: V,
    mem_size: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<V: ByteSize> LRUCache<V> {
    /// Creates a new cache which keeps entries until they occupy **max_memory** bytes.
    ///
    /// Passing 0 creates an unbounded cache.
    pub fn new(max_memory: usize) -> Self {
        LRUCache {
            max_memory,
            allocated_memory: 0,
            reads: 0,
            hits: 0,
            writes: 0,
            slots: Vec::new(),
            free_slots: Vec::new(),
            head: None,
            tail: None,
            index: FnvHashMap::default(),
            on_evicted: None,
        }
    }

    /// Installs a callback which is invoked for every evicted entry.
    ///
    /// The callback runs synchronously within **put** or **remove_oldest** and receives the
    /// evicted key and value.
    ///
    /// # Examples
    /// ```
    /// # use ganymede::lru::LRUCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let log = evicted.clone();
    /// let mut lru = LRUCache::new(8).on_evicted(move |key, _value: String| {
    ///     log.lock().unwrap().push(key);
    /// });
    ///
    /// lru.put("A".to_owned(), "1234".to_owned());
    /// lru.put("B".to_owned(), "1234".to_owned());
    /// assert_eq!(evicted.lock().unwrap().as_slice(), &["A".to_owned()]);
    /// ```
    pub fn on_evicted(mut self, callback: impl FnMut(String, V) + Send + 'static) -> Self {
        self.on_evicted = Some(Box::new(callback));
        self
    }

    /// Stores the given value for the given key.
    ///
    /// An existing entry is replaced and its accounted size is corrected by the difference
    /// between the old and the new value. Either way, the entry becomes the most recently used
    /// one. Afterwards, the least recently used entries are evicted until the cache fits into its
    /// **max_memory** again. Note that an entry which is larger than the whole cache will
    /// therefore be evicted immediately.
    pub fn put(&mut self, key: String, value: V) {
        self.writes += 1;

        let mem_size = key.len() + value.allocated_size();
        if let Some(&slot) = self.index.get(&key) {
            if let Some(entry) = self.slots[slot].as_mut() {
                self.allocated_memory = self.allocated_memory - entry.mem_size + mem_size;
                entry.mem_size = mem_size;
                entry.value = value;
            }
            self.move_to_front(slot);
        } else {
            let slot = self.allocate(Entry {
                key: key.clone(),
                value,
                mem_size,
                prev: None,
                next: None,
            });
            self.attach_front(slot);
            let _ = self.index.insert(key, slot);
            self.allocated_memory += mem_size;
        }

        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_memory != 0 && self.allocated_memory > self.max_memory && self.tail.is_some()
        {
            self.remove_oldest();
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A successful lookup marks the entry as most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        let slot = *self.index.get(key)?;
        self.move_to_front(slot);
        self.hits += 1;

        self.slots[slot].as_ref().map(|entry| &entry.value)
    }

    /// Evicts the least recently used entry.
    ///
    /// This is a no-op for an empty cache. Otherwise the eviction callback (if present) is invoked
    /// for the removed entry.
    pub fn remove_oldest(&mut self) {
        if let Some(slot) = self.tail {
            self.detach(slot);
            if let Some(entry) = self.slots[slot].take() {
                self.free_slots.push(slot);
                let _ = self.index.remove(&entry.key);
                self.allocated_memory -= entry.mem_size;

                if let Some(callback) = self.on_evicted.as_mut() {
                    callback(entry.key, entry.value);
                }
            }
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Lists all keys, starting with the most recently used one.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::successors(self.head, move |slot| {
            self.slots[*slot].as_ref().and_then(|entry| entry.next)
        })
        .filter_map(move |slot| self.slots[slot].as_ref().map(|entry| entry.key.as_str()))
    }

    /// Returns the maximal amount of memory to be occupied by this cache (0 = unbounded).
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Returns the number of bytes occupied by all keys and values of this cache.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the memory utilization in percent.
    ///
    /// An unbounded cache always reports 0.
    pub fn memory_utilization(&self) -> f32 {
        match self.max_memory {
            0 => 0.,
            n => self.allocated_memory as f32 / n as f32 * 100.,
        }
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of reads which found a value.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the total number of writes performed on this cache.
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn allocate(&mut self, entry: Entry<V>) -> usize {
        match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        }
    }

    fn attach_front(&mut self, slot: usize) {
        let previous_head = self.head;
        if let Some(entry) = self.slots[slot].as_mut() {
            entry.prev = None;
            entry.next = previous_head;
        }
        if let Some(previous_head) = previous_head {
            if let Some(entry) = self.slots[previous_head].as_mut() {
                entry.prev = Some(slot);
            }
        }

        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = match self.slots[slot].as_ref() {
            Some(entry) => (entry.prev, entry.next),
            None => return,
        };

        match prev {
            Some(prev) => {
                if let Some(entry) = self.slots[prev].as_mut() {
                    entry.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next) => {
                if let Some(entry) = self.slots[next].as_mut() {
                    entry.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head != Some(slot) {
            self.detach(slot);
            self.attach_front(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::lru::LRUCache;
    use std::sync::{Arc, Mutex};

    #[test]
    fn max_memory_is_enforced() {
        let mut lru = LRUCache::new(12 * 4);

        // We expect 4 entries with a size of 12 bytes each to fully fit in the cache....
        lru.put("Hello0".to_owned(), "World0".to_owned());
        lru.put("Hello1".to_owned(), "World1".to_owned());
        lru.put("Hello2".to_owned(), "World2".to_owned());
        lru.put("Hello3".to_owned(), "World3".to_owned());
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // If we replace an entry, the used memory is corrected...
        lru.put("Hello1".to_owned(), "".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 4 - 6);

        // Restore the original entry...
        lru.put("Hello1".to_owned(), "World1".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 4);
        assert_eq!(
            lru.keys().collect::<Vec<_>>(),
            vec!["Hello1", "Hello3", "Hello2", "Hello0"]
        );

        // If we now add an entry with is 13 bytes long, the two least recently used entries have
        // to be dropped to make room...
        lru.put("Hello4".to_owned(), "World04".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 2 + 13);
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.get("Hello0"), None);
        assert_eq!(lru.get("Hello2"), None);
        assert_eq!(lru.get("Hello1").unwrap(), "World1");
        assert_eq!(lru.get("Hello3").unwrap(), "World3");
        assert_eq!(lru.get("Hello4").unwrap(), "World04");
    }

    #[test]
    fn reads_protect_entries_from_eviction() {
        let mut lru = LRUCache::new(12);
        lru.put("k1".to_owned(), "v1".to_owned());
        lru.put("k2".to_owned(), "v2".to_owned());
        lru.put("k3".to_owned(), "v3".to_owned());

        // Reading k1 makes it the most recently used entry, therefore k2 is the next one to go...
        assert_eq!(lru.get("k1").unwrap(), "v1");
        lru.put("k4".to_owned(), "v4".to_owned());

        assert_eq!(lru.get("k2"), None);
        assert_eq!(lru.get("k1").unwrap(), "v1");
        assert_eq!(lru.get("k3").unwrap(), "v3");
        assert_eq!(lru.get("k4").unwrap(), "v4");
    }

    #[test]
    fn evictions_are_reported() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut lru = LRUCache::new(10).on_evicted(move |key, value: String| {
            log.lock().unwrap().push(format!("{}={}", key, value));
        });

        lru.put("key1".to_owned(), "123456".to_owned());
        lru.put("k2".to_owned(), "k2".to_owned());
        lru.put("k3".to_owned(), "k3".to_owned());
        lru.put("k4".to_owned(), "k4".to_owned());

        // Adding k2 pushed key1 out, adding k4 pushed k2 out...
        assert_eq!(
            evicted.lock().unwrap().as_slice(),
            &["key1=123456".to_owned(), "k2=k2".to_owned()]
        );
        assert_eq!(lru.len(), 2);

        // Explicitly removing the oldest entry also fires the callback...
        lru.remove_oldest();
        assert_eq!(evicted.lock().unwrap().len(), 3);
        assert_eq!(evicted.lock().unwrap()[2], "k3=k3");
        assert_eq!(lru.keys().collect::<Vec<_>>(), vec!["k4"]);
    }

    #[test]
    fn remove_oldest_on_empty_cache_is_a_noop() {
        let mut lru: LRUCache<String> = LRUCache::new(10);
        lru.remove_oldest();
        assert!(lru.is_empty());
        assert_eq!(lru.allocated_memory(), 0);
    }

    #[test]
    fn oversized_entries_are_evicted_immediately() {
        let evictions = Arc::new(Mutex::new(0));
        let counter = evictions.clone();
        let mut lru = LRUCache::new(8).on_evicted(move |_, _: String| {
            *counter.lock().unwrap() += 1;
        });

        lru.put("A".to_owned(), "1".to_owned());
        lru.put("Big".to_owned(), "0123456789".to_owned());

        // The large entry doesn't fit at all, so the cache ends up empty...
        assert!(lru.is_empty());
        assert_eq!(lru.allocated_memory(), 0);
        assert_eq!(*evictions.lock().unwrap(), 2);
    }

    #[test]
    fn an_unbounded_cache_never_evicts() {
        let mut lru = LRUCache::new(0);
        for i in 0..1000 {
            lru.put(format!("key-{}", i), "X".repeat(100));
        }

        assert_eq!(lru.len(), 1000);
        assert_eq!(lru.memory_utilization(), 0.);
    }

    #[test]
    fn retained_entries_are_the_most_recently_used_ones() {
        let max_memory = 64;
        let mut lru = LRUCache::new(max_memory);

        // Tracks (key, size) pairs, starting with the most recently used one...
        let mut recency: Vec<(String, usize)> = Vec::new();
        let touch = |recency: &mut Vec<(String, usize)>, key: &str, size: usize| {
            recency.retain(|(existing, _)| existing != key);
            recency.insert(0, (key.to_owned(), size));
        };

        for i in 0..500usize {
            // Use some varying key and value lengths and revisit older keys every now and then...
            let key = format!("k{}", i % 37);
            let value = "v".repeat(i % 11);
            touch(&mut recency, &key, key.len() + value.len());
            lru.put(key, value);
            while recency.iter().map(|(_, size)| size).sum::<usize>() > max_memory {
                let _ = recency.pop();
            }

            // Reading a key promotes it as well...
            if i % 3 == 0 {
                let read = format!("k{}", (i * 7) % 37);
                if let Some(value) = lru.get(&read) {
                    touch(&mut recency, &read, read.len() + value.len());
                }
            }

            assert!(lru.allocated_memory() <= max_memory);
            assert_eq!(
                lru.allocated_memory(),
                recency.iter().map(|(_, size)| size).sum::<usize>()
            );
            assert_eq!(
                lru.keys().collect::<Vec<_>>(),
                recency.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LRUCache::new(10);

        // Write 3 values into the cache...
        lru.put("A".to_owned(), "A".to_owned());
        lru.put("B".to_owned(), "B".to_owned());
        lru.put("C".to_owned(), "C".to_owned());

        // Perform 4 reads, of which 3 hit a cache entry...
        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_none(), true);

        // ... therefore we hat 3 writes, 4 reads of which 3 hit a value which
        // yields a hit rate of 75%
        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hits(), 3);
        assert_eq!(lru.hit_rate().round() as i32, 75);

        // The cache contains 6 bytes of data and has a max memory of 10 -> 60% memory utilization..
        assert_eq!(lru.allocated_memory(), 6);
        assert_eq!(lru.memory_utilization().round() as i32, 60);
    }
}
