//! Shard-Aware Span Exporter
//!
//! Routes distributed-tracing spans into the shard of a partitioned,
//! append-only stream that owns their trace, keeping every span of a trace
//! on one shard and every record under a size limit.
//!
//! # Pipeline
//!
//! ```text
//! export_span ─► AdmissionGate ─► task: route ─► size guard ─► ShardWriter ─► StreamWriter
//!                  (bounded)        (md5 of       (dropped       (span lists,     (external,
//!                                    trace id)     marker)        fixed key)       batching/retry)
//! ```
//!
//! - [`ShardDirectory`]: one shard listing at startup, validated to tile the
//!   128-bit hash key space
//! - [`PartitionRouter`]: trace id → owning shard, using the service's own
//!   partition key hash
//! - [`WriterPool`]: one [`ShardWriter`] per shard, each pinned to its shard
//!   by a fixed partition key and explicit hash key
//! - [`SizeGuard`]: oversized spans are rewritten into a compact marker
//! - [`AdmissionGate`]: optional bound on in-flight export tasks
//! - [`Exporter`]: validation, wiring and the submit/flush contract
//!
//! The stream service itself sits behind [`StreamBackend`] and
//! [`StreamWriter`]; [`InMemoryBackend`] implements both in process.
//!
//! # Example
//!
//! ```ignore
//! use shard_exporter::{InMemoryBackend, JaegerExporter, Options};
//! use span_wire::jaeger;
//!
//! let backend = InMemoryBackend::with_even_shards(4);
//! let exporter = JaegerExporter::new(Options::new("spans", "us-west-2"), &backend).await?;
//!
//! exporter.export_span(jaeger::Span::new(0x4bf92f3577b34da6, 1, "GET /cart")).await?;
//! exporter.flush().await;
//! ```

pub mod admission;
pub mod backend;
pub mod config;
pub mod directory;
pub mod error;
pub mod exporter;
pub mod memory;
pub mod metrics;
pub mod pool;
pub mod router;
pub mod shard;
pub mod shard_writer;
pub mod size_guard;

// Re-export main types
pub use admission::{AdmissionGate, AdmissionPermit};
pub use backend::{ShardPage, StreamBackend, StreamWriter, StreamWriterBoxed};
pub use config::{AwsConfig, ExporterConfig, ListConfig, Options, ProducerConfig, StreamTarget};
pub use directory::ShardDirectory;
pub use error::{
    BackendError, ConfigError, DiscoveryError, ExportError, ExporterError, GateClosed, RouteError,
    SubmitError, WriterError,
};
pub use exporter::{Exporter, ExporterState, JaegerExporter, OcExporter};
pub use memory::{InMemoryBackend, InMemoryWriter, PutRecord};
pub use metrics::{ExporterMetrics, ExporterMetricsSnapshot, ShardMetrics, ShardMetricsSnapshot};
pub use pool::WriterPool;
pub use router::{partition_hash, PartitionRouter};
pub use shard::{HashKeyRange, RawShard, RecordKey, ShardDescriptor};
pub use shard_writer::{ShardWriter, WriterPhase};
pub use size_guard::{EncodedSpan, SizeGuard};

pub use span_wire::{Encoding, SpanCodec};
