//! Partition Router
//!
//! Maps a routing key to the shard that owns `md5(key)`, the same placement
//! the stream service applies to partition keys. Because the directory's
//! ranges are sorted and disjoint, lookup is a binary search on range start
//! followed by a containment check. A miss is an error, never a fallback
//! shard.

use crate::directory::ShardDirectory;
use crate::error::RouteError;
use crate::shard::ShardDescriptor;
use std::sync::Arc;

/// The service's partition key hash: MD5 read as a big-endian `u128`.
#[inline]
pub fn partition_hash(key: &[u8]) -> u128 {
    u128::from_be_bytes(md5::compute(key).0)
}

/// Resolves routing keys to shards.
#[derive(Debug, Clone)]
pub struct PartitionRouter {
    /// Sorted by `range.start`
    shards: Vec<Arc<ShardDescriptor>>,
}

impl PartitionRouter {
    pub fn new(directory: &ShardDirectory) -> Self {
        Self::from_shards(directory.shards().to_vec())
    }

    /// Builds a router over arbitrary descriptors. Coverage is not checked
    /// here; keys whose hash no descriptor owns fail with `NoShard`.
    pub fn from_shards(mut shards: Vec<Arc<ShardDescriptor>>) -> Self {
        shards.sort_by_key(|s| s.range.start);
        Self { shards }
    }

    /// Returns the shard owning `key`.
    pub fn route(&self, key: &[u8]) -> Result<&Arc<ShardDescriptor>, RouteError> {
        self.route_hash(partition_hash(key))
    }

    /// Returns the shard owning an already computed hash.
    pub fn route_hash(&self, hash: u128) -> Result<&Arc<ShardDescriptor>, RouteError> {
        // First shard starting above `hash`; the candidate is the one before it
        let idx = self.shards.partition_point(|s| s.range.start <= hash);
        idx.checked_sub(1)
            .map(|i| &self.shards[i])
            .filter(|s| s.range.contains(hash))
            .ok_or(RouteError::NoShard { hash })
    }

    /// Reference lookup scanning every shard.
    pub fn route_linear(&self, key: &[u8]) -> Result<&Arc<ShardDescriptor>, RouteError> {
        let hash = partition_hash(key);
        self.shards
            .iter()
            .find(|s| s.range.contains(hash))
            .ok_or(RouteError::NoShard { hash })
    }

    pub fn shards(&self) -> &[Arc<ShardDescriptor>] {
        &self.shards
    }
}
