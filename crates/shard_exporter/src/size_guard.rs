//! Size Guard
//!
//! Enforces the per-span record limit on the real encoded length. A span
//! over the limit is rewritten into the dropped marker form (three
//! `omnition.dropped*` entries, no logs/events) and encoded again; only that
//! second encoding ever leaves the guard.

use bytes::Bytes;
use span_wire::{SpanCodec, WireError};
use tracing::warn;

/// An encoded span that passed the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSpan {
    pub bytes: Bytes,
    /// Size of the original encoding if the span was replaced by the marker
    pub dropped_from: Option<usize>,
}

impl EncodedSpan {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            dropped_from: None,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn was_dropped(&self) -> bool {
        self.dropped_from.is_some()
    }
}

/// Maximum encoded size per span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeGuard {
    max_bytes: usize,
}

impl SizeGuard {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Encodes `span`, truncating it first if its encoding exceeds the limit.
    pub fn enforce<C: SpanCodec>(&self, mut span: C::Span) -> Result<EncodedSpan, WireError> {
        let encoded = C::encode(&span)?;
        let original_size = encoded.len();
        if original_size <= self.max_bytes {
            return Ok(EncodedSpan::new(encoded));
        }

        C::apply_dropped_marker(&mut span, original_size);
        let marked = C::encode(&span)?;
        if marked.len() > self.max_bytes {
            warn!(
                original_size,
                marked_size = marked.len(),
                max_bytes = self.max_bytes,
                "span still exceeds size limit after dropping its payload"
            );
        }

        Ok(EncodedSpan {
            bytes: Bytes::from(marked),
            dropped_from: Some(original_size),
        })
    }
}
