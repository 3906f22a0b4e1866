//! The codec capability shared by both span schemas.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tag marking a span whose payload was stripped.
pub const DROPPED_KEY: &str = "omnition.dropped";
/// Tag carrying why the payload was stripped.
pub const DROPPED_REASON_KEY: &str = "omnition.dropped.reason";
/// Tag carrying the encoded size before stripping.
pub const DROPPED_SIZE_KEY: &str = "omnition.dropped.size";
/// The only drop reason this crate produces.
pub const DROPPED_REASON: &str = "unsupported size";

/// Errors produced while encoding or inspecting a span.
#[derive(Debug, Error)]
pub enum WireError {
    /// Protobuf marshaling failed
    #[error("failed to encode span: {0}")]
    Encode(#[from] prost::EncodeError),
    /// The trace id cannot be used as a routing key
    #[error("invalid trace id of {len} bytes")]
    InvalidTraceId { len: usize },
}

/// Supported span encodings, named as they appear in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Encoding {
    /// Jaeger protobuf spans
    #[default]
    #[serde(rename = "jaeger-proto")]
    JaegerProto,
    /// OpenCensus protobuf spans
    #[serde(rename = "oc-proto")]
    OcProto,
}

impl Encoding {
    /// Every recognized encoding, default first.
    pub const ALL: [Encoding; 2] = [Encoding::JaegerProto, Encoding::OcProto];

    /// Returns the configuration name of this encoding.
    pub const fn as_str(self) -> &'static str {
        match self {
            Encoding::JaegerProto => "jaeger-proto",
            Encoding::OcProto => "oc-proto",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a configuration names an encoding this crate does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown encoding {0:?}, valid choices are: jaeger-proto, oc-proto")]
pub struct UnknownEncoding(pub String);

impl FromStr for Encoding {
    type Err = UnknownEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Encoding::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEncoding(s.to_string()))
    }
}

/// What the export pipeline needs from a span schema.
///
/// Implementors are zero-sized markers; all operations are associated
/// functions over [`SpanCodec::Span`].
pub trait SpanCodec: Send + Sync + 'static {
    /// The in-memory span type of this schema.
    type Span: Send + 'static;

    /// The configuration name this codec answers to.
    const ENCODING: Encoding;

    /// Bytes whose partition hash decides the owning shard.
    ///
    /// All spans of one trace must yield the same key.
    fn routing_key(span: &Self::Span) -> Result<Vec<u8>, WireError>;

    /// Marshals a single span.
    fn encode(span: &Self::Span) -> Result<Vec<u8>, WireError>;

    /// Rewrites `span` into the dropped marker form: the three `omnition.dropped*`
    /// entries replace its tags/attributes and its logs/events are cleared.
    fn apply_dropped_marker(span: &mut Self::Span, original_size: usize);
}

/// Marshals a message into an exactly-sized buffer.
pub(crate) fn encode_message<M: prost::Message>(message: &M) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    message.encode(&mut buf)?;
    Ok(buf)
}
