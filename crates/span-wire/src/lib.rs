//! Span Wire Schemas
//!
//! The two span encodings an exporter can ship to a stream, behind one small
//! capability trait so the export pipeline is written once:
//!
//! - [`JaegerProto`]: Jaeger `model.proto` spans (`jaeger-proto`)
//! - [`OcProto`]: OpenCensus `trace/v1` spans (`oc-proto`)
//!
//! Each codec knows how to encode a span, which bytes identify its trace for
//! shard routing, and how to rewrite an oversized span into the compact
//! "dropped" marker form.
//!
//! Records sent to the stream are span lists (`repeated Span spans = 1`).
//! [`SpanListBuilder`] frames already-encoded spans into that shape so a span
//! is marshaled exactly once.
//!
//! # Example
//!
//! ```ignore
//! use span_wire::{JaegerProto, SpanCodec, SpanListBuilder};
//!
//! let encoded = JaegerProto::encode(&span)?;
//! let mut list = SpanListBuilder::new();
//! list.push(&encoded);
//! let record = list.finish();
//! ```

pub mod codec;
pub mod jaeger;
pub mod opencensus;
pub mod span_list;
pub mod well_known;

pub use codec::{Encoding, SpanCodec, UnknownEncoding, WireError};
pub use codec::{DROPPED_KEY, DROPPED_REASON, DROPPED_REASON_KEY, DROPPED_SIZE_KEY};
pub use jaeger::JaegerProto;
pub use opencensus::OcProto;
pub use span_list::SpanListBuilder;
