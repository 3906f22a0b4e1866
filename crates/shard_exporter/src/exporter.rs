//! Exporter
//!
//! Wires the shard directory, partition router, writer pool, size guard and
//! admission gate together behind two calls:
//!
//! - [`Exporter::export_span`]: admit a span and hand it to a tracked task
//!   that routes, size-guards and submits it. Per-span failures are logged
//!   and counted, never returned.
//! - [`Exporter::flush`]: stop accepting spans, wait for every in-flight
//!   task, stop every shard writer, then close the admission gate.
//!
//! # Lifecycle
//!
//! ```text
//! new():   Validating -> DiscoveringShards -> StartingWriters
//!          -> Running --flush()--> Draining -> Stopped
//! ```

use crate::admission::AdmissionGate;
use crate::backend::StreamBackend;
use crate::config::{ExporterConfig, Options};
use crate::directory::ShardDirectory;
use crate::error::{ConfigError, ExportError, ExporterError};
use crate::metrics::{ExporterMetrics, ShardMetricsSnapshot};
use crate::pool::WriterPool;
use crate::router::PartitionRouter;
use crate::size_guard::SizeGuard;
use span_wire::{JaegerProto, OcProto, SpanCodec};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Exporter for `jaeger-proto` spans.
pub type JaegerExporter = Exporter<JaegerProto>;
/// Exporter for `oc-proto` spans.
pub type OcExporter = Exporter<OcProto>;

/// Observable lifecycle state once construction succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterState {
    /// Accepting spans
    Running,
    /// `flush()` in progress; new spans are rejected
    Draining,
    /// Every writer is stopped and the gate is closed
    Stopped,
}

/// Everything an export task needs, shared behind one `Arc`.
#[derive(Debug)]
struct Pipeline {
    name: String,
    router: PartitionRouter,
    pool: WriterPool,
    guard: SizeGuard,
    metrics: ExporterMetrics,
}

impl Pipeline {
    /// route -> size guard -> submit, for one span.
    async fn process<C: SpanCodec>(&self, span: C::Span) {
        let key = match C::routing_key(&span) {
            Ok(key) => key,
            Err(error) => {
                self.metrics.record_wire_error();
                warn!(exporter = %self.name, error = %error, "span has no usable trace id");
                return;
            }
        };

        let shard = match self.router.route(&key) {
            Ok(shard) => Arc::clone(shard),
            Err(error) => {
                self.metrics.record_route_error();
                warn!(exporter = %self.name, error = %error, "failed to find shard for span");
                return;
            }
        };

        let encoded = match self.guard.enforce::<C>(span) {
            Ok(encoded) => encoded,
            Err(error) => {
                self.metrics.record_wire_error();
                warn!(
                    exporter = %self.name,
                    shard_id = %shard.id,
                    error = %error,
                    "failed to encode span"
                );
                return;
            }
        };

        let Some(writer) = self.pool.writer_for(&shard) else {
            self.metrics.record_route_error();
            warn!(exporter = %self.name, shard_id = %shard.id, "no writer for shard");
            return;
        };

        if let Some(original_size) = encoded.dropped_from {
            self.metrics.record_xl_dropped(original_size);
            writer.metrics().record_xl_dropped(original_size);
            warn!(
                exporter = %self.name,
                shard_id = %shard.id,
                size = original_size,
                max_size = self.guard.max_bytes(),
                "span exceeds max allowed size, payload dropped"
            );
        }

        if let Err(error) = writer.submit(encoded).await {
            self.metrics.record_submit_error();
            warn!(
                exporter = %self.name,
                shard_id = %shard.id,
                error = %error,
                "error putting span"
            );
        }
    }
}

/// Shard-aware span exporter for one codec.
pub struct Exporter<C: SpanCodec> {
    config: ExporterConfig,
    directory: ShardDirectory,
    pipeline: Arc<Pipeline>,
    gate: AdmissionGate,
    tasks: TaskTracker,
    /// Write-locked only to leave `Running`; read-locked around spawn
    state: RwLock<ExporterState>,
    _codec: PhantomData<fn(C::Span)>,
}

impl<C: SpanCodec> Exporter<C> {
    /// Validates `options`, discovers the stream's shards and starts one
    /// writer per shard.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn new<B: StreamBackend>(options: Options, backend: &B) -> Result<Self, ExporterError> {
        let config = options.resolve()?;
        Self::from_config(config, backend).await
    }

    /// Like [`new`](Self::new) for an already resolved configuration.
    pub async fn from_config<B: StreamBackend>(
        config: ExporterConfig,
        backend: &B,
    ) -> Result<Self, ExporterError> {
        if config.encoding != C::ENCODING {
            return Err(ConfigError::EncodingMismatch {
                configured: config.encoding,
                codec: C::ENCODING,
            }
            .into());
        }

        debug!(exporter = %config.name, stream = %config.target.stream_name, "discovering shards");
        let directory = ShardDirectory::discover(backend, &config.target).await?;
        let router = PartitionRouter::new(&directory);

        debug!(exporter = %config.name, shards = directory.len(), "starting shard writers");
        let pool = WriterPool::start(&directory, backend, &config)?;
        let gate = AdmissionGate::new(config.max_concurrent_exports);

        info!(
            exporter = %config.name,
            stream = %config.target.stream_name,
            region = %config.target.aws.region,
            encoding = %config.encoding,
            shards = directory.len(),
            max_concurrent_exports = ?config.max_concurrent_exports,
            "kinesis exporter running"
        );

        Ok(Self {
            pipeline: Arc::new(Pipeline {
                name: config.name.clone(),
                router,
                pool,
                guard: SizeGuard::new(config.max_allowed_size_per_span),
                metrics: ExporterMetrics::default(),
            }),
            config,
            directory,
            gate,
            tasks: TaskTracker::new(),
            state: RwLock::new(ExporterState::Running),
            _codec: PhantomData,
        })
    }

    /// Admits `span` and hands it to a background export task.
    ///
    /// Waits only for an admission slot. Routing, encoding and submit
    /// failures happen later and are counted in [`metrics`](Self::metrics);
    /// the only error is [`ExportError::ShutDown`] once `flush` has begun.
    pub async fn export_span(&self, span: C::Span) -> Result<(), ExportError> {
        if self.state() != ExporterState::Running {
            self.pipeline.metrics.record_rejected();
            return Err(ExportError::ShutDown);
        }
        let metrics = &self.pipeline.metrics;
        metrics.record_enqueued();

        let Ok(permit) = self.gate.acquire().await else {
            metrics.record_rejected();
            metrics.record_dequeued();
            return Err(ExportError::ShutDown);
        };

        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if *state != ExporterState::Running {
            drop(state);
            metrics.record_rejected();
            metrics.record_dequeued();
            return Err(ExportError::ShutDown);
        }

        let pipeline = Arc::clone(&self.pipeline);
        self.tasks.spawn(async move {
            pipeline.process::<C>(span).await;
            pipeline.metrics.record_dequeued();
            drop(permit);
        });
        Ok(())
    }

    /// Stops accepting spans, waits for in-flight tasks, stops every shard
    /// writer (each flushes what it buffered) and closes the admission gate.
    ///
    /// Calls after the first return immediately.
    pub async fn flush(&self) {
        {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if *state != ExporterState::Running {
                return;
            }
            *state = ExporterState::Draining;
        }
        info!(exporter = %self.config.name, in_flight = self.tasks.len(), "draining exporter");

        self.tasks.close();
        self.tasks.wait().await;

        let failed = self.pipeline.pool.stop_all().await;
        self.gate.drain();

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = ExporterState::Stopped;
        let metrics = self.pipeline.metrics.snapshot();
        info!(
            exporter = %self.config.name,
            failed_writers = failed,
            spans_enqueued = metrics.spans_enqueued,
            spans_dequeued = metrics.spans_dequeued,
            xl_spans_dropped = metrics.xl_spans_dropped,
            xl_bytes_dropped = metrics.xl_bytes_dropped,
            "exporter stopped"
        );
    }

    pub fn state(&self) -> ExporterState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn metrics(&self) -> &ExporterMetrics {
        &self.pipeline.metrics
    }

    /// Per-shard counters keyed by shard id.
    pub fn shard_metrics(&self) -> BTreeMap<String, ShardMetricsSnapshot> {
        self.pipeline
            .pool
            .writers()
            .iter()
            .map(|writer| (writer.shard().id.clone(), writer.metrics().snapshot()))
            .collect()
    }

    pub fn directory(&self) -> &ShardDirectory {
        &self.directory
    }

    pub fn router(&self) -> &PartitionRouter {
        &self.pipeline.router
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn admission(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Export tasks admitted but not finished.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

impl<C: SpanCodec> std::fmt::Debug for Exporter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("name", &self.config.name)
            .field("encoding", &C::ENCODING)
            .field("shards", &self.directory.len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
