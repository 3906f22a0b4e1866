//! Interfaces to the stream service.
//!
//! The exporter never talks to the service directly. A [`StreamBackend`]
//! answers the control-plane shard listing and hands out one
//! [`StreamWriter`] per shard; the writer owns batching, aggregation,
//! retries and backoff toward the service.
//!
//! Both traits use native async fn in traits. [`StreamWriterBoxed`] is the
//! object-safe twin the writer pool stores behind `Arc<dyn _>`.

use crate::config::{ProducerConfig, StreamTarget};
use crate::error::{BackendError, WriterError};
use crate::shard::{RawShard, RecordKey, ShardDescriptor};
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// One page of a shard listing.
#[derive(Debug, Clone, Default)]
pub struct ShardPage {
    pub shards: Vec<RawShard>,
    /// Present when more pages follow
    pub next_token: Option<String>,
}

/// A stream service: shard listing plus per-shard writer construction.
pub trait StreamBackend: Send + Sync {
    /// Lists one page of the stream's shards, starting after `next_token`.
    fn list_shards(
        &self,
        target: &StreamTarget,
        next_token: Option<String>,
    ) -> impl Future<Output = Result<ShardPage, BackendError>> + Send;

    /// Creates (but does not start) the writer for one shard.
    fn create_writer(
        &self,
        shard: &ShardDescriptor,
        target: &StreamTarget,
        config: &ProducerConfig,
    ) -> Result<Arc<dyn StreamWriterBoxed>, BackendError>;
}

/// External batching writer bound to one shard.
pub trait StreamWriter: Send + Sync {
    /// Launches the writer's internal flush machinery.
    fn start(&self) {}

    /// Enqueues one record for delivery.
    fn put(
        &self,
        data: Bytes,
        key: &RecordKey,
    ) -> impl Future<Output = Result<(), WriterError>> + Send;

    /// Flushes everything buffered and releases the writer's resources.
    fn stop(&self) -> impl Future<Output = Result<(), WriterError>> + Send;
}

/// Object-safe version of [`StreamWriter`] for dynamic dispatch.
pub trait StreamWriterBoxed: Send + Sync {
    fn start_boxed(&self);

    fn put_boxed<'a>(
        &'a self,
        data: Bytes,
        key: &'a RecordKey,
    ) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + 'a>>;

    fn stop_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + '_>>;
}

/// Blanket implementation: any StreamWriter can be used as StreamWriterBoxed
impl<T: StreamWriter> StreamWriterBoxed for T {
    fn start_boxed(&self) {
        StreamWriter::start(self);
    }

    fn put_boxed<'a>(
        &'a self,
        data: Bytes,
        key: &'a RecordKey,
    ) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + 'a>> {
        Box::pin(self.put(data, key))
    }

    fn stop_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), WriterError>> + Send + '_>> {
        Box::pin(self.stop())
    }
}
