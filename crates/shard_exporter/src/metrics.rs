//! Exporter and per-shard counters.
//!
//! Plain atomics shared between export tasks, shard writer tasks and
//! whoever scrapes them. They are observability signals only; nothing in
//! the export path branches on them.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Exporter-wide counters.
#[derive(Debug, Default)]
pub struct ExporterMetrics {
    spans_enqueued: AtomicU64,
    spans_dequeued: AtomicU64,
    spans_rejected: AtomicU64,
    xl_spans_dropped: AtomicU64,
    xl_bytes_dropped: AtomicU64,
    route_errors: AtomicU64,
    wire_errors: AtomicU64,
    submit_errors: AtomicU64,
}

impl ExporterMetrics {
    pub fn spans_enqueued(&self) -> u64 {
        self.spans_enqueued.load(Ordering::Relaxed)
    }

    pub fn spans_dequeued(&self) -> u64 {
        self.spans_dequeued.load(Ordering::Relaxed)
    }

    /// Spans refused because the exporter was shutting down.
    pub fn spans_rejected(&self) -> u64 {
        self.spans_rejected.load(Ordering::Relaxed)
    }

    /// Spans replaced by the dropped marker.
    pub fn xl_spans_dropped(&self) -> u64 {
        self.xl_spans_dropped.load(Ordering::Relaxed)
    }

    /// Encoded size of the payloads the marker replaced.
    pub fn xl_bytes_dropped(&self) -> u64 {
        self.xl_bytes_dropped.load(Ordering::Relaxed)
    }

    pub fn route_errors(&self) -> u64 {
        self.route_errors.load(Ordering::Relaxed)
    }

    pub fn wire_errors(&self) -> u64 {
        self.wire_errors.load(Ordering::Relaxed)
    }

    pub fn submit_errors(&self) -> u64 {
        self.submit_errors.load(Ordering::Relaxed)
    }

    /// Spans admitted but not yet finished.
    pub fn in_flight(&self) -> u64 {
        self.spans_enqueued().saturating_sub(self.spans_dequeued())
    }

    /// Spans that never reached a shard writer.
    pub fn failed(&self) -> u64 {
        self.route_errors() + self.wire_errors() + self.submit_errors()
    }

    pub(crate) fn record_enqueued(&self) {
        self.spans_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dequeued(&self) {
        self.spans_dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.spans_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_xl_dropped(&self, size: usize) {
        self.xl_spans_dropped.fetch_add(1, Ordering::Relaxed);
        self.xl_bytes_dropped.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_route_error(&self) {
        self.route_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_wire_error(&self) {
        self.wire_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submit_error(&self) {
        self.submit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ExporterMetricsSnapshot {
        ExporterMetricsSnapshot {
            spans_enqueued: self.spans_enqueued(),
            spans_dequeued: self.spans_dequeued(),
            spans_rejected: self.spans_rejected(),
            xl_spans_dropped: self.xl_spans_dropped(),
            xl_bytes_dropped: self.xl_bytes_dropped(),
            route_errors: self.route_errors(),
            wire_errors: self.wire_errors(),
            submit_errors: self.submit_errors(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExporterMetricsSnapshot {
    pub spans_enqueued: u64,
    pub spans_dequeued: u64,
    pub spans_rejected: u64,
    pub xl_spans_dropped: u64,
    pub xl_bytes_dropped: u64,
    pub route_errors: u64,
    pub wire_errors: u64,
    pub submit_errors: u64,
}

/// Counters of one shard writer.
#[derive(Debug, Default)]
pub struct ShardMetrics {
    spans_submitted: AtomicU64,
    spans_put: AtomicU64,
    lists_put: AtomicU64,
    bytes_put: AtomicU64,
    put_failures: AtomicU64,
    spans_failed: AtomicU64,
    xl_spans_dropped: AtomicU64,
    xl_bytes_dropped: AtomicU64,
}

impl ShardMetrics {
    pub fn spans_submitted(&self) -> u64 {
        self.spans_submitted.load(Ordering::Relaxed)
    }

    /// Spans inside lists the external writer accepted.
    pub fn spans_put(&self) -> u64 {
        self.spans_put.load(Ordering::Relaxed)
    }

    pub fn lists_put(&self) -> u64 {
        self.lists_put.load(Ordering::Relaxed)
    }

    pub fn bytes_put(&self) -> u64 {
        self.bytes_put.load(Ordering::Relaxed)
    }

    pub fn put_failures(&self) -> u64 {
        self.put_failures.load(Ordering::Relaxed)
    }

    /// Spans inside lists the external writer rejected.
    pub fn spans_failed(&self) -> u64 {
        self.spans_failed.load(Ordering::Relaxed)
    }

    pub fn xl_spans_dropped(&self) -> u64 {
        self.xl_spans_dropped.load(Ordering::Relaxed)
    }

    pub fn xl_bytes_dropped(&self) -> u64 {
        self.xl_bytes_dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_submitted(&self) {
        self.spans_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put(&self, spans: u64, bytes: u64) {
        self.spans_put.fetch_add(spans, Ordering::Relaxed);
        self.lists_put.fetch_add(1, Ordering::Relaxed);
        self.bytes_put.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_put_failure(&self, spans: u64) {
        self.put_failures.fetch_add(1, Ordering::Relaxed);
        self.spans_failed.fetch_add(spans, Ordering::Relaxed);
    }

    pub(crate) fn record_xl_dropped(&self, size: usize) {
        self.xl_spans_dropped.fetch_add(1, Ordering::Relaxed);
        self.xl_bytes_dropped.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ShardMetricsSnapshot {
        ShardMetricsSnapshot {
            spans_submitted: self.spans_submitted(),
            spans_put: self.spans_put(),
            lists_put: self.lists_put(),
            bytes_put: self.bytes_put(),
            put_failures: self.put_failures(),
            spans_failed: self.spans_failed(),
            xl_spans_dropped: self.xl_spans_dropped(),
            xl_bytes_dropped: self.xl_bytes_dropped(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShardMetricsSnapshot {
    pub spans_submitted: u64,
    pub spans_put: u64,
    pub lists_put: u64,
    pub bytes_put: u64,
    pub put_failures: u64,
    pub spans_failed: u64,
    pub xl_spans_dropped: u64,
    pub xl_bytes_dropped: u64,
}
