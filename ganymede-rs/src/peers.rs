//! Defines the capabilities a group needs to fetch values from other nodes.
//!
//! A [Group](crate::group::Group) doesn't know anything about the network. All it needs is a
//! [PeerPicker] which determines the node owning a key and a [PeerGetter] per remote node which
//! can fetch a value from there. The HTTP based implementation of both can be found in
//! [http](crate::http), but any other transport can be plugged in.
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// Describes a value to be fetched from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Contains the name of the group to query.
    pub group: String,

    /// Contains the key to fetch.
    pub key: String,
}

/// Contains the value delivered by a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResponse {
    /// Contains the raw bytes of the value.
    pub value: Bytes,
}

/// Locates the peer which owns a given key.
pub trait PeerPicker: Send + Sync {
    /// Returns the peer to ask for the given key.
    ///
    /// Returns **None** if the key is owned by the local node (or if there are no peers at all).
    /// Repeated calls with the same key must yield the same peer as long as the topology doesn't
    /// change.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches values from a single remote node.
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Fetches the value for the given group and key from the remote node.
    async fn get(&self, request: &FetchRequest) -> anyhow::Result<FetchResponse>;
}
