//! Provides named cache groups which load missing values through a user supplied getter.
//!
//! A [Group] is a named cache namespace. A lookup first checks the local cache. On a miss, the
//! group asks its [PeerPicker] (if one has been registered) which node owns the key. If this is a
//! remote node, the value is fetched from there and handed out **without** being stored in the
//! local cache (otherwise each value would eventually be cached on every node). If the key is
//! owned by this node, or if the peer fails, the value is produced by the [Getter] of the group and
//! stored in the local cache.
//!
//! Concurrent misses for the same key are coalesced via a
//! [CallCoalescer](crate::singleflight::CallCoalescer), so that the getter (or the peer) is only
//! asked once, no matter how many clients are waiting for the value.
//!
//! All groups of a node are kept in a [Groups] registry which is installed in the
//! [Platform](crate::platform::Platform).
//!
//! # Examples
//! ```
//! # use std::sync::Arc;
//! # use ganymede::group::{FnGetter, Groups};
//! # #[tokio::main]
//! # async fn main() {
//! let groups = Groups::new();
//! let scores = groups.new_group(
//!     "scores",
//!     2 << 10,
//!     Arc::new(FnGetter::new(|key| match key {
//!         "Tom" => Ok(b"630".to_vec()),
//!         _ => Err(anyhow::anyhow!("{} not exist", key)),
//!     })),
//! );
//!
//! assert_eq!(scores.get("Tom").await.unwrap().to_text(), "630");
//! assert_eq!(
//!     scores.get("Jerry").await.unwrap_err().to_string(),
//!     "Jerry not exist"
//! );
//! # }
//! ```
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;

use crate::byte_span::ByteSpan;
use crate::fmt::{format_size, SEPARATOR};
use crate::lru::{CacheStats, SyncedCache};
use crate::peers::{FetchRequest, PeerGetter, PeerPicker};
use crate::platform::Platform;
use crate::singleflight::CallCoalescer;

/// Produces the value for a key which is not present in the cache.
///
/// This is the connection to the (slow) source of truth, like a database. A getter has to be
/// deterministic, as different nodes might invoke it for the same key over time.
#[async_trait]
pub trait Getter: Send + Sync {
    /// Loads the value for the given key.
    ///
    /// The returned bytes are owned by the group afterwards.
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Adapts a plain function or closure so that it can be used as [Getter].
pub struct FnGetter<F> {
    function: F,
}

impl<F> FnGetter<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    /// Wraps the given function.
    pub fn new(function: F) -> Self {
        FnGetter { function }
    }
}

#[async_trait]
impl<F> Getter for FnGetter<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.function)(key)
    }
}

/// Keeps the counters of a group.
#[derive(Default)]
pub struct GroupStats {
    gets: AtomicUsize,
    cache_hits: AtomicUsize,
    loads: AtomicUsize,
    loads_deduped: AtomicUsize,
    peer_loads: AtomicUsize,
    peer_errors: AtomicUsize,
    local_loads: AtomicUsize,
    local_load_errors: AtomicUsize,
    server_requests: AtomicUsize,
}

fn increment(counter: &AtomicUsize) {
    let _ = counter.fetch_add(1, Ordering::Relaxed);
}

impl GroupStats {
    /// Returns the number of lookups (including invalid ones).
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::Relaxed)
    }

    /// Returns the number of lookups answered by the local cache.
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Returns the number of cache misses which had to be loaded (before coalescing).
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// Returns the number of loads which were actually executed (after coalescing).
    pub fn loads_deduped(&self) -> usize {
        self.loads_deduped.load(Ordering::Relaxed)
    }

    /// Returns the number of values successfully fetched from a peer.
    pub fn peer_loads(&self) -> usize {
        self.peer_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of failed peer fetches.
    pub fn peer_errors(&self) -> usize {
        self.peer_errors.load(Ordering::Relaxed)
    }

    /// Returns the number of values successfully produced by the getter.
    pub fn local_loads(&self) -> usize {
        self.local_loads.load(Ordering::Relaxed)
    }

    /// Returns the number of failed getter invocations.
    pub fn local_load_errors(&self) -> usize {
        self.local_load_errors.load(Ordering::Relaxed)
    }

    /// Returns the number of requests received from other nodes.
    pub fn server_requests(&self) -> usize {
        self.server_requests.load(Ordering::Relaxed)
    }

    pub(crate) fn record_server_request(&self) {
        increment(&self.server_requests);
    }
}

/// Represents a named cache namespace backed by a getter.
pub struct Group {
    name: String,
    getter: Arc<dyn Getter>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    main_cache: SyncedCache,
    loader: CallCoalescer<ByteSpan>,
    stats: GroupStats,
}

impl Group {
    fn new(name: &str, cache_bytes: usize, getter: Arc<dyn Getter>) -> Self {
        Group {
            name: name.to_owned(),
            getter,
            peers: OnceLock::new(),
            main_cache: SyncedCache::new(cache_bytes),
            loader: CallCoalescer::new(),
            stats: GroupStats::default(),
        }
    }

    /// Returns the name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provides access to the counters of this group.
    pub fn stats(&self) -> &GroupStats {
        &self.stats
    }

    /// Returns the metrics of the local cache of this group.
    pub fn cache_stats(&self) -> CacheStats {
        self.main_cache.stats()
    }

    /// Installs the peer picker which is used to locate the owner of a key.
    ///
    /// # Panics
    /// Panics if a picker has already been registered for this group.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) {
        if self.peers.set(peers).is_err() {
            panic!("register_peers called more than once (group: {})", self.name);
        }
    }

    /// Returns the value for the given key.
    ///
    /// Serves the value from the local cache if possible. Otherwise it is loaded from the owning
    /// peer or via the getter of this group. Fails if the key is empty or if the value cannot be
    /// loaded. Failures are never cached.
    pub async fn get(&self, key: &str) -> anyhow::Result<ByteSpan> {
        increment(&self.stats.gets);
        if key.is_empty() {
            return Err(anyhow::anyhow!("key is required"));
        }

        if let Some(value) = self.main_cache.get(key) {
            log::debug!("[{}] Cache hit for {}", self.name, key);
            increment(&self.stats.cache_hits);
            return Ok(value);
        }

        self.load(key).await
    }

    async fn load(&self, key: &str) -> anyhow::Result<ByteSpan> {
        increment(&self.stats.loads);
        self.loader
            .execute(key, || async {
                increment(&self.stats.loads_deduped);
                self.fetch(key).await
            })
            .await
            .map_err(anyhow::Error::new)
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<ByteSpan> {
        if let Some(peer) = self.peers.get().and_then(|peers| peers.pick_peer(key)) {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(value) => {
                    increment(&self.stats.peer_loads);
                    return Ok(value);
                }
                Err(error) => {
                    increment(&self.stats.peer_errors);
                    log::warn!(
                        "[{}] Failed to fetch {} from its peer: {:#}. Loading it locally...",
                        self.name,
                        key,
                        error
                    );
                }
            }
        }

        self.get_locally(key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> anyhow::Result<ByteSpan> {
        let request = FetchRequest {
            group: self.name.clone(),
            key: key.to_owned(),
        };
        let response = peer.get(&request).await?;

        Ok(ByteSpan::from(response.value))
    }

    async fn get_locally(&self, key: &str) -> anyhow::Result<ByteSpan> {
        let bytes = match self.getter.get(key).await {
            Ok(bytes) => bytes,
            Err(error) => {
                increment(&self.stats.local_load_errors);
                return Err(error);
            }
        };
        increment(&self.stats.local_loads);

        let value = ByteSpan::from(bytes);
        self.populate_cache(key, value.clone());

        Ok(value)
    }

    fn populate_cache(&self, key: &str, value: ByteSpan) {
        self.main_cache.add(key, value);
    }
}

/// Keeps all groups of a node by their name.
#[derive(Default)]
pub struct Groups {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl Groups {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Groups::default()
    }

    /// Creates an empty registry and registers it in the given platform.
    pub fn install(platform: &Arc<Platform>) -> Arc<Self> {
        let groups = Arc::new(Groups::new());
        platform.register::<Groups>(groups.clone());

        groups
    }

    /// Creates and registers a new group.
    ///
    /// The local cache of the group will occupy at most **cache_bytes** (0 = unbounded). A group
    /// which has previously been registered with the same name is replaced.
    pub fn new_group(&self, name: &str, cache_bytes: usize, getter: Arc<dyn Getter>) -> Arc<Group> {
        let group = Arc::new(Group::new(name, cache_bytes, getter));

        let mut groups = self.groups.write().unwrap();
        if groups.insert(name.to_owned(), group.clone()).is_some() {
            log::info!("Replaced the existing group {}.", name);
        } else {
            log::info!(
                "Created group {} (max cache size: {}).",
                name,
                format_size(cache_bytes)
            );
        }

        group
    }

    /// Returns the group with the given name.
    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().unwrap().get(name).cloned()
    }

    /// Returns all known groups ordered by their name.
    pub fn all(&self) -> Vec<Arc<Group>> {
        let mut groups: Vec<Arc<Group>> =
            self.groups.read().unwrap().values().cloned().collect();
        groups.sort_by(|left, right| left.name.cmp(&right.name));

        groups
    }

    /// Renders a table which outlines the state of all groups.
    pub fn report(&self) -> String {
        let mut result = String::new();

        result += format!(
            "{:<20} {:>8} {:>10} {:>10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
            "Group",
            "Entries",
            "Memory",
            "Max",
            "Gets",
            "Hits",
            "Loads",
            "Peer",
            "Local",
            "Served"
        )
        .as_str();
        result += SEPARATOR;

        for group in self.all() {
            let cache = group.cache_stats();
            let stats = group.stats();
            result += format!(
                "{:<20} {:>8} {:>10} {:>10} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}\n",
                group.name(),
                cache.entries,
                format_size(cache.allocated_memory),
                format_size(cache.max_memory),
                stats.gets(),
                stats.cache_hits(),
                stats.loads_deduped(),
                stats.peer_loads(),
                stats.local_loads(),
                stats.server_requests()
            )
            .as_str();
        }
        result += SEPARATOR;

        result
    }
}
