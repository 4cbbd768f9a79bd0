//! Provides a consistent hash ring which maps keys onto peers.
//!
//! Each peer is placed on the ring several times (once per **replica**, also known as virtual
//! node). The position of a virtual node is the hash of the replica number followed by the peer
//! name. A key is owned by the peer of the first virtual node at or after the hash of the key,
//! wrapping around to the first position if there is none. Adding more replicas per peer smooths
//! out the distribution of the keys.
//!
//! The ring is append-only: peers can be added in batches but never removed. To change the
//! topology, a new ring has to be built (see [HttpPool::set_peers](crate::http::HttpPool::set_peers)).
//!
//! # Examples
//! ```
//! # use ganymede::ring::HashRing;
//! let mut ring = HashRing::new(50);
//! ring.add(["http://10.0.0.1:8001", "http://10.0.0.2:8001"]);
//!
//! let owner = ring.get("Tom").unwrap().to_owned();
//! assert_eq!(ring.get("Tom"), Some(owner.as_str()));
//! ```
use fnv::FnvHashMap;

/// Computes the ring position of the given data.
pub type HashFn = fn(&[u8]) -> u32;

/// Specifies the number of virtual nodes per peer used if nothing else is configured.
pub const DEFAULT_REPLICAS: usize = 50;

/// Maps keys onto a set of peers using consistent hashing.
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    positions: Vec<u32>,
    owners: FnvHashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring which places each peer **replicas** times using CRC-32 (IEEE).
    pub fn new(replicas: usize) -> Self {
        HashRing::with_hash(replicas, crc32fast::hash)
    }

    /// Creates an empty ring which uses the given hash function.
    ///
    /// This is mostly useful for tests which need predictable positions.
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        HashRing {
            hash,
            replicas,
            positions: Vec::new(),
            owners: FnvHashMap::default(),
        }
    }

    /// Places the given peers on the ring.
    ///
    /// Note that if two virtual nodes end up on the same position, the one added last wins.
    pub fn add<I, S>(&mut self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for peer in peers {
            let peer = peer.as_ref();
            for replica in 0..self.replicas {
                let position = (self.hash)(format!("{}{}", replica, peer).as_bytes());
                self.positions.push(position);
                let _ = self.owners.insert(position, peer.to_owned());
            }
        }

        self.positions.sort_unstable();
    }

    /// Determines the peer which owns the given key.
    ///
    /// Returns **None** if no peers have been added yet.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());
        let index = self.positions.partition_point(|position| *position < hash);
        let position = self.positions[index % self.positions.len()];

        self.owners.get(&position).map(|peer| peer.as_str())
    }

    /// Returns the number of virtual nodes on the ring.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Determines if no peer has been added yet.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
