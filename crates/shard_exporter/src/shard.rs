//! Shard descriptors and the 128-bit hash key space.
//!
//! The stream service maps every partition key to `md5(key)` read as an
//! unsigned 128-bit integer, and each open shard owns a closed interval
//! `[start, end]` of that space. The whole space is `[0, u128::MAX]`, so plain
//! `u128` comparison is exact.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A closed interval of the hash key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashKeyRange {
    pub start: u128,
    pub end: u128,
}

impl HashKeyRange {
    /// Parses the service's decimal string bounds.
    ///
    /// Returns `None` if either bound is not a decimal integer in `[0, 2^128)`.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self {
            start: parse_hash_key(start)?,
            end: parse_hash_key(end)?,
        })
    }

    /// Returns `true` if `hash` falls in `[start, end]`.
    #[inline]
    pub fn contains(&self, hash: u128) -> bool {
        self.start <= hash && hash <= self.end
    }

    /// Splits the full hash key space into `n` contiguous ranges of
    /// (nearly) equal width, the layout a freshly created stream gets.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub fn split_even(n: usize) -> Vec<HashKeyRange> {
        assert!(n > 0, "cannot split the hash key space into zero shards");
        let n = n as u128;
        let width = u128::MAX / n;
        let starts: Vec<u128> = (0..n).map(|i| width * i + i).collect();

        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| HashKeyRange {
                start,
                end: starts.get(i + 1).map_or(u128::MAX, |next| next - 1),
            })
            .collect()
    }
}

impl fmt::Display for HashKeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Parses one decimal hash key bound.
pub(crate) fn parse_hash_key(s: &str) -> Option<u128> {
    // `u128::from_str` accepts a leading '+', the service never sends one
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// An open shard as discovered at startup. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShardDescriptor {
    /// Position in the directory's start-sorted shard list
    pub ordinal: usize,
    pub id: String,
    pub range: HashKeyRange,
}

impl ShardDescriptor {
    /// The fixed key every record of this shard's writer carries.
    pub fn record_key(&self) -> RecordKey {
        let key = self.range.start.to_string();
        RecordKey {
            partition_key: key.clone(),
            explicit_hash_key: key,
        }
    }
}

/// A shard as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawShard {
    pub shard_id: String,
    pub starting_hash_key: String,
    pub ending_hash_key: String,
    /// Set once a shard is closed by a split or merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_sequence_number: Option<String>,
}

impl RawShard {
    /// An open shard over `range`.
    pub fn open(shard_id: impl Into<String>, range: HashKeyRange) -> Self {
        Self {
            shard_id: shard_id.into(),
            starting_hash_key: range.start.to_string(),
            ending_hash_key: range.end.to_string(),
            ending_sequence_number: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.ending_sequence_number.is_none()
    }
}

/// Partition key and explicit hash key attached to a shard's records.
///
/// Both are the shard's range start in decimal, so the service places every
/// record in that shard no matter how it hashes the partition key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub partition_key: String,
    pub explicit_hash_key: String,
}
