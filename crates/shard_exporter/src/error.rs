//! Error types for the exporter.
//!
//! Startup errors ([`ExporterError`]) are the only ones returned to the
//! constructing caller. Per-span errors ([`RouteError`], [`SubmitError`],
//! [`span_wire::WireError`]) are logged and counted inside export tasks.

use span_wire::{Encoding, UnknownEncoding};
use thiserror::Error;

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing stream name for kinesis exporter")]
    MissingStreamName,
    #[error("missing AWS region for kinesis exporter")]
    MissingRegion,
    #[error(transparent)]
    UnknownEncoding(#[from] UnknownEncoding),
    /// The exporter was instantiated for a different codec than configured.
    #[error("exporter built for {codec} but options select {configured}")]
    EncodingMismatch { configured: Encoding, codec: Encoding },
}

/// Error reported by a stream backend (control plane or writer factory).
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error reported by an external stream writer.
#[derive(Debug, Clone, Error)]
pub enum WriterError {
    /// The record was rejected after the writer's own retries
    #[error("put rejected: {0}")]
    Rejected(String),
    /// The writer is no longer accepting records
    #[error("writer stopped")]
    Stopped,
    /// Flushing buffered records on stop failed
    #[error("stop failed: {0}")]
    Stop(String),
}

/// Shard discovery failed.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    #[error("listing shards of {stream} failed: {source}")]
    Backend {
        stream: String,
        #[source]
        source: BackendError,
    },
    #[error("stream {0} has no open shards")]
    NoOpenShards(String),
    #[error("shard {shard_id}: invalid hash key {value:?}")]
    InvalidHashKey { shard_id: String, value: String },
    #[error("shard {shard_id}: starting hash key is above ending hash key")]
    InvertedRange { shard_id: String },
    #[error("hash keys {from}..={to} are not owned by any open shard")]
    Gap { from: u128, to: u128 },
    #[error("shards {first} and {second} overlap")]
    Overlap { first: String, second: String },
    #[error("open shards end at {last_end}, short of the full hash key space")]
    IncompleteCoverage { last_end: u128 },
}

/// No shard owns the hash of a routing key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no shard found for partition hash {hash}")]
    NoShard { hash: u128 },
}

/// A shard writer refused an encoded span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("shard writer has not been started")]
    NotStarted,
    #[error("shard writer is stopped")]
    Stopped,
}

/// Exporter construction failed. No writer is left running.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("shard discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("creating writer for shard {shard_id} failed: {source}")]
    WriterSetup {
        shard_id: String,
        #[source]
        source: BackendError,
    },
}

/// Returned by `export_span` once the exporter is flushing or stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("exporter is shut down")]
    ShutDown,
}

/// The admission gate was drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("admission gate is closed")]
pub struct GateClosed;
