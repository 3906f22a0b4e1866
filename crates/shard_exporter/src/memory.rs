//! In-process stream backend.
//!
//! Serves a fixed shard listing (optionally paginated) and hands out
//! [`InMemoryWriter`]s that keep every record they are given. Used by the
//! demo binary and throughout the tests; failures can be injected on the
//! listing, on writer creation and on individual writers.

use crate::backend::{ShardPage, StreamBackend, StreamWriter, StreamWriterBoxed};
use crate::config::{ProducerConfig, StreamTarget};
use crate::error::{BackendError, WriterError};
use crate::shard::{HashKeyRange, RawShard, RecordKey, ShardDescriptor};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const DEFAULT_PAGE_SIZE: usize = 1000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A stream whose shards and records live in memory.
#[derive(Debug)]
pub struct InMemoryBackend {
    shards: Vec<RawShard>,
    page_size: usize,
    list_calls: AtomicUsize,
    listing_failure: Mutex<Option<String>>,
    writer_failures: Mutex<HashMap<String, String>>,
    writers: Mutex<HashMap<String, Arc<InMemoryWriter>>>,
}

impl InMemoryBackend {
    pub fn new(shards: Vec<RawShard>) -> Self {
        Self {
            shards,
            page_size: DEFAULT_PAGE_SIZE,
            list_calls: AtomicUsize::new(0),
            listing_failure: Mutex::new(None),
            writer_failures: Mutex::new(HashMap::new()),
            writers: Mutex::new(HashMap::new()),
        }
    }

    /// A stream of `n` open shards splitting the hash key space evenly,
    /// named `shardId-000000000000` upwards.
    pub fn with_even_shards(n: usize) -> Self {
        let shards = HashKeyRange::split_even(n)
            .into_iter()
            .enumerate()
            .map(|(i, range)| RawShard::open(format!("shardId-{:012}", i), range))
            .collect();
        Self::new(shards)
    }

    /// Caps how many shards one listing page returns.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes every subsequent listing call fail.
    pub fn fail_listing(&self, message: impl Into<String>) {
        *lock(&self.listing_failure) = Some(message.into());
    }

    /// Makes creating the writer of `shard_id` fail.
    pub fn fail_writer_creation(&self, shard_id: impl Into<String>, message: impl Into<String>) {
        lock(&self.writer_failures).insert(shard_id.into(), message.into());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// The writer created for `shard_id`, if any.
    pub fn writer(&self, shard_id: &str) -> Option<Arc<InMemoryWriter>> {
        lock(&self.writers).get(shard_id).cloned()
    }

    /// Every writer created so far, keyed by shard id.
    pub fn writers(&self) -> HashMap<String, Arc<InMemoryWriter>> {
        lock(&self.writers).clone()
    }
}

impl StreamBackend for InMemoryBackend {
    async fn list_shards(
        &self,
        _target: &StreamTarget,
        next_token: Option<String>,
    ) -> Result<ShardPage, BackendError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(message) = lock(&self.listing_failure).clone() {
            return Err(BackendError(message));
        }

        let from = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| BackendError::new(format!("invalid next token {:?}", token)))?,
            None => 0,
        };
        let to = (from + self.page_size).min(self.shards.len());

        Ok(ShardPage {
            shards: self.shards.get(from..to).unwrap_or_default().to_vec(),
            next_token: (to < self.shards.len()).then(|| to.to_string()),
        })
    }

    fn create_writer(
        &self,
        shard: &ShardDescriptor,
        _target: &StreamTarget,
        config: &ProducerConfig,
    ) -> Result<Arc<dyn StreamWriterBoxed>, BackendError> {
        if let Some(message) = lock(&self.writer_failures).get(&shard.id) {
            return Err(BackendError(message.clone()));
        }

        let writer = Arc::new(InMemoryWriter::new(config.clone()));
        lock(&self.writers).insert(shard.id.clone(), Arc::clone(&writer));
        Ok(writer)
    }
}

/// A record accepted by an [`InMemoryWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub data: Bytes,
    pub key: RecordKey,
}

/// Stream writer that keeps its records.
#[derive(Debug, Default)]
pub struct InMemoryWriter {
    config: ProducerConfig,
    records: Mutex<Vec<PutRecord>>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    puts_after_stop: AtomicUsize,
    stopped: AtomicBool,
    put_failure: Mutex<Option<String>>,
    put_delay: Mutex<Option<Duration>>,
}

impl InMemoryWriter {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Makes every subsequent put fail with `message`.
    pub fn fail_puts(&self, message: impl Into<String>) {
        *lock(&self.put_failure) = Some(message.into());
    }

    /// Slows every put down, standing in for a congested stream.
    pub fn delay_puts(&self, delay: Duration) {
        *lock(&self.put_delay) = Some(delay);
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    pub fn records(&self) -> Vec<PutRecord> {
        lock(&self.records).clone()
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::Acquire)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::Acquire)
    }

    /// Puts attempted after `stop`; always zero for a well-behaved caller.
    pub fn puts_after_stop(&self) -> usize {
        self.puts_after_stop.load(Ordering::Acquire)
    }
}

impl StreamWriter for InMemoryWriter {
    fn start(&self) {
        self.start_calls.fetch_add(1, Ordering::AcqRel);
    }

    async fn put(&self, data: Bytes, key: &RecordKey) -> Result<(), WriterError> {
        if self.stopped.load(Ordering::Acquire) {
            self.puts_after_stop.fetch_add(1, Ordering::AcqRel);
            return Err(WriterError::Stopped);
        }

        let delay = *lock(&self.put_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = lock(&self.put_failure).clone() {
            return Err(WriterError::Rejected(message));
        }

        lock(&self.records).push(PutRecord {
            data,
            key: key.clone(),
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), WriterError> {
        self.stop_calls.fetch_add(1, Ordering::AcqRel);
        self.stopped.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsConfig;

    fn target() -> StreamTarget {
        StreamTarget {
            stream_name: "spans".to_string(),
            aws: AwsConfig {
                region: "us-east-1".to_string(),
                role_arn: None,
                endpoint: None,
            },
        }
    }

    #[tokio::test]
    async fn test_listing_pages_until_exhausted() {
        let backend = InMemoryBackend::with_even_shards(5).with_page_size(2);

        let first = backend.list_shards(&target(), None).await.unwrap();
        assert_eq!(first.shards.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("2"));

        let last = backend
            .list_shards(&target(), Some("4".to_string()))
            .await
            .unwrap();
        assert_eq!(last.shards.len(), 1);
        assert_eq!(last.next_token, None);
        assert_eq!(backend.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_bad_token_is_a_backend_error() {
        let backend = InMemoryBackend::with_even_shards(1);
        assert!(backend
            .list_shards(&target(), Some("nope".to_string()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_writer_rejects_after_stop() {
        let writer = InMemoryWriter::default();
        let key = RecordKey {
            partition_key: "0".to_string(),
            explicit_hash_key: "0".to_string(),
        };

        writer.put(Bytes::from_static(b"a"), &key).await.unwrap();
        writer.stop().await.unwrap();
        assert!(matches!(
            writer.put(Bytes::from_static(b"b"), &key).await,
            Err(WriterError::Stopped)
        ));

        assert_eq!(writer.records().len(), 1);
        assert_eq!(writer.stop_calls(), 1);
        assert_eq!(writer.puts_after_stop(), 1);
    }

    #[tokio::test]
    async fn test_injected_put_failure() {
        let writer = InMemoryWriter::default();
        writer.fail_puts("ProvisionedThroughputExceededException");
        let key = RecordKey {
            partition_key: "1".to_string(),
            explicit_hash_key: "1".to_string(),
        };
        let err = writer.put(Bytes::new(), &key).await.unwrap_err();
        assert!(matches!(err, WriterError::Rejected(ref m) if m.contains("Throughput")));
        assert!(writer.records().is_empty());
    }
}
