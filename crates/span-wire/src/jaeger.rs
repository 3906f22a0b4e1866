//! Jaeger `model.proto` spans.
//!
//! Field numbers follow `jaeger.api_v2` so records decode with stock Jaeger
//! tooling. Only the span graph the exporter touches is modeled.

use crate::codec::{encode_message, Encoding, SpanCodec, WireError};
use crate::codec::{DROPPED_KEY, DROPPED_REASON, DROPPED_REASON_KEY, DROPPED_SIZE_KEY};
use crate::well_known::{Duration, Timestamp};

/// Jaeger tag value discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ValueType {
    String = 0,
    Bool = 1,
    Int64 = 2,
    Float64 = 3,
    Binary = 4,
}

/// A typed tag or log field.
#[derive(Clone, PartialEq, prost::Message)]
pub struct KeyValue {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(enumeration = "ValueType", tag = "2")]
    pub v_type: i32,
    #[prost(string, tag = "3")]
    pub v_str: String,
    #[prost(bool, tag = "4")]
    pub v_bool: bool,
    #[prost(int64, tag = "5")]
    pub v_int64: i64,
    #[prost(double, tag = "6")]
    pub v_float64: f64,
    #[prost(bytes = "vec", tag = "7")]
    pub v_binary: Vec<u8>,
}

impl KeyValue {
    pub fn string(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            v_type: ValueType::String as i32,
            v_str: value.into(),
            ..Default::default()
        }
    }

    pub fn bool(key: impl Into<String>, value: bool) -> Self {
        Self {
            key: key.into(),
            v_type: ValueType::Bool as i32,
            v_bool: value,
            ..Default::default()
        }
    }

    pub fn int64(key: impl Into<String>, value: i64) -> Self {
        Self {
            key: key.into(),
            v_type: ValueType::Int64 as i32,
            v_int64: value,
            ..Default::default()
        }
    }
}

/// Reference type between spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SpanRefType {
    ChildOf = 0,
    FollowsFrom = 1,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SpanRef {
    #[prost(bytes = "vec", tag = "1")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub span_id: Vec<u8>,
    #[prost(enumeration = "SpanRefType", tag = "3")]
    pub ref_type: i32,
}

/// A timestamped set of fields attached to a span.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Log {
    #[prost(message, optional, tag = "1")]
    pub timestamp: Option<Timestamp>,
    #[prost(message, repeated, tag = "2")]
    pub fields: Vec<KeyValue>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Process {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(message, repeated, tag = "2")]
    pub tags: Vec<KeyValue>,
}

/// A Jaeger span. `trace_id` is 16 bytes, high word first.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Span {
    #[prost(bytes = "vec", tag = "1")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub span_id: Vec<u8>,
    #[prost(string, tag = "3")]
    pub operation_name: String,
    #[prost(message, repeated, tag = "4")]
    pub references: Vec<SpanRef>,
    #[prost(uint32, tag = "5")]
    pub flags: u32,
    #[prost(message, optional, tag = "6")]
    pub start_time: Option<Timestamp>,
    #[prost(message, optional, tag = "7")]
    pub duration: Option<Duration>,
    #[prost(message, repeated, tag = "8")]
    pub tags: Vec<KeyValue>,
    #[prost(message, repeated, tag = "9")]
    pub logs: Vec<Log>,
    #[prost(message, optional, tag = "10")]
    pub process: Option<Process>,
    #[prost(string, tag = "11")]
    pub process_id: String,
    #[prost(string, repeated, tag = "12")]
    pub warnings: Vec<String>,
}

impl Span {
    /// Creates a span for the given 128-bit trace id and 64-bit span id.
    pub fn new(trace_id: u128, span_id: u64, operation_name: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.to_be_bytes().to_vec(),
            span_id: span_id.to_be_bytes().to_vec(),
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }
}

/// The record shape written to the stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SpanList {
    #[prost(message, repeated, tag = "1")]
    pub spans: Vec<Span>,
}

/// Renders a trace id the way Jaeger prints `TraceID`: the high word is
/// omitted when zero, otherwise the low word is zero-padded to 16 digits.
pub fn trace_id_hex(trace_id: &[u8]) -> Result<String, WireError> {
    let bytes: [u8; 16] = trace_id
        .try_into()
        .map_err(|_| WireError::InvalidTraceId { len: trace_id.len() })?;
    let id = u128::from_be_bytes(bytes);
    let high = (id >> 64) as u64;
    let low = id as u64;

    Ok(if high == 0 {
        format!("{:x}", low)
    } else {
        format!("{:x}{:016x}", high, low)
    })
}

/// `jaeger-proto` codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JaegerProto;

impl SpanCodec for JaegerProto {
    type Span = Span;

    const ENCODING: Encoding = Encoding::JaegerProto;

    fn routing_key(span: &Span) -> Result<Vec<u8>, WireError> {
        trace_id_hex(&span.trace_id).map(String::into_bytes)
    }

    fn encode(span: &Span) -> Result<Vec<u8>, WireError> {
        encode_message(span)
    }

    fn apply_dropped_marker(span: &mut Span, original_size: usize) {
        span.tags = vec![
            KeyValue::bool(DROPPED_KEY, true),
            KeyValue::string(DROPPED_REASON_KEY, DROPPED_REASON),
            KeyValue::int64(DROPPED_SIZE_KEY, original_size as i64),
        ];
        span.logs.clear();
    }
}
