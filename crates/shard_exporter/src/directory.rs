//! Shard Directory
//!
//! One discovery pass at startup: page through the control-plane listing,
//! keep the open shards, parse their hash key ranges and check that they
//! tile the whole hash key space. The result is immutable; re-sharding after
//! startup is not tracked.

use crate::backend::StreamBackend;
use crate::config::StreamTarget;
use crate::error::DiscoveryError;
use crate::shard::{parse_hash_key, HashKeyRange, RawShard, ShardDescriptor};
use std::sync::Arc;
use tracing::{debug, info};

/// The stream's open shards, sorted by range start.
#[derive(Debug, Clone)]
pub struct ShardDirectory {
    stream_name: String,
    shards: Vec<Arc<ShardDescriptor>>,
}

impl ShardDirectory {
    /// Lists every shard of `target` and builds the directory.
    pub async fn discover<B: StreamBackend>(
        backend: &B,
        target: &StreamTarget,
    ) -> Result<Self, DiscoveryError> {
        let mut raw = Vec::new();
        let mut next_token = None;
        let mut pages = 0usize;

        loop {
            let page = backend
                .list_shards(target, next_token.take())
                .await
                .map_err(|source| DiscoveryError::Backend {
                    stream: target.stream_name.clone(),
                    source,
                })?;
            pages += 1;
            raw.extend(page.shards);

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!(
            stream = %target.stream_name,
            pages,
            listed = raw.len(),
            "listed stream shards"
        );

        let directory = Self::from_raw(&target.stream_name, raw)?;
        info!(
            stream = %target.stream_name,
            shards = directory.len(),
            "discovered open shards"
        );
        Ok(directory)
    }

    /// Validates a complete shard listing.
    pub fn from_raw(
        stream_name: &str,
        raw: impl IntoIterator<Item = RawShard>,
    ) -> Result<Self, DiscoveryError> {
        let mut parsed = Vec::new();
        for shard in raw {
            if !shard.is_open() {
                debug!(shard_id = %shard.shard_id, "skipping closed shard");
                continue;
            }
            let range = parse_range(&shard)?;
            parsed.push((shard.shard_id, range));
        }

        if parsed.is_empty() {
            return Err(DiscoveryError::NoOpenShards(stream_name.to_string()));
        }

        parsed.sort_by_key(|(_, range)| range.start);
        check_coverage(&parsed)?;

        let shards = parsed
            .into_iter()
            .enumerate()
            .map(|(ordinal, (id, range))| Arc::new(ShardDescriptor { ordinal, id, range }))
            .collect();

        Ok(Self {
            stream_name: stream_name.to_string(),
            shards,
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// Shards in range-start order; `shards()[i].ordinal == i`.
    pub fn shards(&self) -> &[Arc<ShardDescriptor>] {
        &self.shards
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Always `false` for a successfully discovered directory.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

fn parse_range(shard: &RawShard) -> Result<HashKeyRange, DiscoveryError> {
    let parse = |value: &str| {
        parse_hash_key(value).ok_or_else(|| DiscoveryError::InvalidHashKey {
            shard_id: shard.shard_id.clone(),
            value: value.to_string(),
        })
    };
    let range = HashKeyRange {
        start: parse(&shard.starting_hash_key)?,
        end: parse(&shard.ending_hash_key)?,
    };

    if range.start > range.end {
        return Err(DiscoveryError::InvertedRange {
            shard_id: shard.shard_id.clone(),
        });
    }
    Ok(range)
}

/// Sorted ranges must start at 0, abut exactly and end at `u128::MAX`.
fn check_coverage(sorted: &[(String, HashKeyRange)]) -> Result<(), DiscoveryError> {
    let first = sorted[0].1;
    if first.start != 0 {
        return Err(DiscoveryError::Gap {
            from: 0,
            to: first.start - 1,
        });
    }

    for pair in sorted.windows(2) {
        let (prev_id, prev) = &pair[0];
        let (next_id, next) = &pair[1];
        if next.start <= prev.end {
            return Err(DiscoveryError::Overlap {
                first: prev_id.clone(),
                second: next_id.clone(),
            });
        }
        if next.start - 1 != prev.end {
            return Err(DiscoveryError::Gap {
                from: prev.end + 1,
                to: next.start - 1,
            });
        }
    }

    let last_end = sorted[sorted.len() - 1].1.end;
    if last_end != u128::MAX {
        return Err(DiscoveryError::IncompleteCoverage { last_end });
    }
    Ok(())
}
