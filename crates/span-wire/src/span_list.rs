//! Span-list framing over pre-encoded spans.
//!
//! A span list is `message SpanList { repeated Span spans = 1; }`. On the
//! wire that is nothing but each span as a length-delimited field 1, so a
//! list can be assembled from span bytes the size guard already produced
//! instead of marshaling every span a second time.

use bytes::Bytes;
use prost::encoding::{encode_key, encode_varint, encoded_len_varint, key_len, WireType};

const SPANS_TAG: u32 = 1;

/// Accumulates encoded spans into one span-list record.
#[derive(Debug, Default)]
pub struct SpanListBuilder {
    buf: Vec<u8>,
    spans: usize,
}

impl SpanListBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            spans: 0,
        }
    }

    /// Bytes a span of `span_len` occupies once framed into a list.
    pub fn framed_len(span_len: usize) -> usize {
        key_len(SPANS_TAG) + encoded_len_varint(span_len as u64) + span_len
    }

    /// Appends one encoded span.
    pub fn push(&mut self, encoded_span: &[u8]) {
        encode_key(SPANS_TAG, WireType::LengthDelimited, &mut self.buf);
        encode_varint(encoded_span.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(encoded_span);
        self.spans += 1;
    }

    /// Encoded size of the list so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans == 0
    }

    /// Number of spans pushed since the last [`finish`](Self::finish).
    pub fn span_count(&self) -> usize {
        self.spans
    }

    /// Takes the finished record and resets the builder for reuse.
    pub fn finish(&mut self) -> Bytes {
        self.spans = 0;
        Bytes::from(std::mem::take(&mut self.buf))
    }
}
