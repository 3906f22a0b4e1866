//! Shard Writer
//!
//! One writer per open shard. Encoded spans go into a bounded queue; a
//! background task frames them into span lists and hands each list to the
//! shard's external [`StreamWriter`](crate::backend::StreamWriter) with the
//! shard's fixed [`RecordKey`].
//!
//! # Lifecycle
//!
//! `Idle --start()--> Running --stop()--> Stopped`
//!
//! `stop()` closes the queue, drains everything already queued, flushes the
//! last list and only then stops the external writer, exactly once.

use crate::backend::StreamWriterBoxed;
use crate::config::ListConfig;
use crate::error::{SubmitError, WriterError};
use crate::metrics::ShardMetrics;
use crate::shard::{RecordKey, ShardDescriptor};
use crate::size_guard::EncodedSpan;
use span_wire::SpanListBuilder;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle phase of a [`ShardWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterPhase {
    Idle,
    Running,
    Stopped,
}

struct ListTask {
    handle: JoinHandle<Result<(), WriterError>>,
    shutdown_tx: oneshot::Sender<()>,
}

/// Writer bound to a single shard.
pub struct ShardWriter {
    shard: Arc<ShardDescriptor>,
    key: RecordKey,
    writer: Arc<dyn StreamWriterBoxed>,
    config: ListConfig,
    metrics: Arc<ShardMetrics>,
    phase: AtomicU8,
    tx: mpsc::Sender<EncodedSpan>,
    /// Moved into the list task by `start()`
    rx: Mutex<Option<mpsc::Receiver<EncodedSpan>>>,
    task: Mutex<Option<ListTask>>,
}

impl ShardWriter {
    pub fn new(
        shard: Arc<ShardDescriptor>,
        writer: Arc<dyn StreamWriterBoxed>,
        config: ListConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));
        Self {
            key: shard.record_key(),
            shard,
            writer,
            config,
            metrics: Arc::new(ShardMetrics::default()),
            phase: AtomicU8::new(IDLE),
            tx,
            rx: Mutex::new(Some(rx)),
            task: Mutex::new(None),
        }
    }

    pub fn shard(&self) -> &Arc<ShardDescriptor> {
        &self.shard
    }

    /// The key carried by every record this writer emits.
    pub fn record_key(&self) -> &RecordKey {
        &self.key
    }

    pub fn metrics(&self) -> &Arc<ShardMetrics> {
        &self.metrics
    }

    pub fn phase(&self) -> WriterPhase {
        match self.phase.load(Ordering::Acquire) {
            IDLE => WriterPhase::Idle,
            RUNNING => WriterPhase::Running,
            _ => WriterPhase::Stopped,
        }
    }

    /// Starts the external writer and the list task.
    ///
    /// Must be called from within a tokio runtime. Later calls are no-ops.
    pub fn start(&self) {
        // Held across the phase change so a racing stop() sees the task
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .phase
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let Some(rx) = self.rx.lock().unwrap_or_else(PoisonError::into_inner).take() else {
            return;
        };

        self.writer.start_boxed();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let aggregator = ListAggregator {
            shard_id: self.shard.id.clone(),
            key: self.key.clone(),
            writer: Arc::clone(&self.writer),
            max_list_size: self.config.max_list_size,
            metrics: Arc::clone(&self.metrics),
            list: SpanListBuilder::with_capacity(self.config.max_list_size),
        };
        let handle = tokio::spawn(aggregator.run(rx, shutdown_rx, self.config.flush_interval));

        *task = Some(ListTask {
            handle,
            shutdown_tx,
        });
    }

    /// Queues one encoded span, waiting while the queue is full.
    pub async fn submit(&self, span: EncodedSpan) -> Result<(), SubmitError> {
        match self.phase() {
            WriterPhase::Idle => return Err(SubmitError::NotStarted),
            WriterPhase::Stopped => return Err(SubmitError::Stopped),
            WriterPhase::Running => {}
        }

        self.tx.send(span).await.map_err(|_| SubmitError::Stopped)?;
        self.metrics.record_submitted();
        Ok(())
    }

    /// Drains the queue, flushes the final list and stops the external writer.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub async fn stop(&self) -> Result<(), WriterError> {
        let task = {
            let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
            if self.phase.swap(STOPPED, Ordering::AcqRel) == STOPPED {
                return Ok(());
            }
            task.take()
        };

        match task {
            Some(ListTask {
                handle,
                shutdown_tx,
            }) => {
                // The task may already be gone if it panicked
                let _ = shutdown_tx.send(());
                match handle.await {
                    Ok(result) => result,
                    Err(join_error) => Err(WriterError::Stop(join_error.to_string())),
                }
            }
            // Never started: nothing is buffered, release the writer
            None => self.writer.stop_boxed().await,
        }
    }
}

impl std::fmt::Debug for ShardWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardWriter")
            .field("shard", &self.shard.id)
            .field("partition_key", &self.key.partition_key)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

/// State owned by the list task.
struct ListAggregator {
    shard_id: String,
    key: RecordKey,
    writer: Arc<dyn StreamWriterBoxed>,
    max_list_size: usize,
    metrics: Arc<ShardMetrics>,
    list: SpanListBuilder,
}

impl ListAggregator {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<EncodedSpan>,
        mut shutdown_rx: oneshot::Receiver<()>,
        flush_interval: Duration,
    ) -> Result<(), WriterError> {
        // `interval` panics on a zero period
        let mut ticker = tokio::time::interval(flush_interval.max(MIN_FLUSH_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(span) => self.add(span).await,
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
                // Fires on stop() and when the ShardWriter is dropped
                _ = &mut shutdown_rx => break,
            }
        }

        rx.close();
        let mut drained = 0usize;
        while let Some(span) = rx.recv().await {
            self.add(span).await;
            drained += 1;
        }
        self.flush().await;
        debug!(shard_id = %self.shard_id, drained, "shard writer drained");

        self.writer.stop_boxed().await
    }

    async fn add(&mut self, span: EncodedSpan) {
        let framed = SpanListBuilder::framed_len(span.size());
        if !self.list.is_empty() && self.list.len() + framed > self.max_list_size {
            self.flush().await;
        }

        self.list.push(&span.bytes);
        if self.list.len() >= self.max_list_size {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        if self.list.is_empty() {
            return;
        }
        let spans = self.list.span_count() as u64;
        let record = self.list.finish();
        let bytes = record.len() as u64;

        match self.writer.put_boxed(record, &self.key).await {
            Ok(()) => {
                self.metrics.record_put(spans, bytes);
                debug!(shard_id = %self.shard_id, spans, bytes, "flushed span list");
            }
            Err(error) => {
                self.metrics.record_put_failure(spans);
                warn!(
                    shard_id = %self.shard_id,
                    spans,
                    bytes,
                    error = %error,
                    "stream writer rejected span list"
                );
            }
        }
    }
}
