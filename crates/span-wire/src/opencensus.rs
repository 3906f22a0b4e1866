//! OpenCensus `trace/v1` spans.

use crate::codec::{encode_message, Encoding, SpanCodec, WireError};
use crate::codec::{DROPPED_KEY, DROPPED_REASON, DROPPED_REASON_KEY, DROPPED_SIZE_KEY};
use crate::well_known::Timestamp;
use std::collections::BTreeMap;

/// A string that records how many bytes were cut from it.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct TruncatableString {
    #[prost(string, tag = "1")]
    pub value: String,
    #[prost(int32, tag = "2")]
    pub truncated_byte_count: i32,
}

impl From<&str> for TruncatableString {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
            truncated_byte_count: 0,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AttributeValue {
    #[prost(oneof = "attribute_value::Value", tags = "1, 2, 3, 4")]
    pub value: Option<attribute_value::Value>,
}

pub mod attribute_value {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "1")]
        StringValue(super::TruncatableString),
        #[prost(int64, tag = "2")]
        IntValue(i64),
        #[prost(bool, tag = "3")]
        BoolValue(bool),
        #[prost(double, tag = "4")]
        DoubleValue(f64),
    }
}

impl AttributeValue {
    pub fn string(value: &str) -> Self {
        Self {
            value: Some(attribute_value::Value::StringValue(value.into())),
        }
    }

    pub fn int(value: i64) -> Self {
        Self {
            value: Some(attribute_value::Value::IntValue(value)),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self {
            value: Some(attribute_value::Value::BoolValue(value)),
        }
    }
}

/// Span attributes. Kept ordered so encoding is deterministic.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Attributes {
    #[prost(btree_map = "string, message", tag = "1")]
    pub attribute_map: BTreeMap<String, AttributeValue>,
    #[prost(int32, tag = "2")]
    pub dropped_attributes_count: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Annotation {
    #[prost(message, optional, tag = "1")]
    pub description: Option<TruncatableString>,
    #[prost(message, optional, tag = "2")]
    pub attributes: Option<Attributes>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageEventType {
    Unspecified = 0,
    Sent = 1,
    Received = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MessageEvent {
    #[prost(enumeration = "MessageEventType", tag = "1")]
    pub event_type: i32,
    #[prost(uint64, tag = "2")]
    pub id: u64,
    #[prost(uint64, tag = "3")]
    pub uncompressed_size: u64,
    #[prost(uint64, tag = "4")]
    pub compressed_size: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeEvent {
    #[prost(message, optional, tag = "1")]
    pub time: Option<Timestamp>,
    #[prost(oneof = "time_event::Value", tags = "2, 3")]
    pub value: Option<time_event::Value>,
}

pub mod time_event {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Value {
        #[prost(message, tag = "2")]
        Annotation(super::Annotation),
        #[prost(message, tag = "3")]
        MessageEvent(super::MessageEvent),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct TimeEvents {
    #[prost(message, repeated, tag = "1")]
    pub time_event: Vec<TimeEvent>,
    #[prost(int32, tag = "2")]
    pub dropped_annotations_count: i32,
    #[prost(int32, tag = "3")]
    pub dropped_message_events_count: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum SpanKind {
    Unspecified = 0,
    Server = 1,
    Client = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Status {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

/// An OpenCensus span.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Span {
    #[prost(bytes = "vec", tag = "1")]
    pub trace_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub span_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub parent_span_id: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub name: Option<TruncatableString>,
    #[prost(message, optional, tag = "5")]
    pub start_time: Option<Timestamp>,
    #[prost(message, optional, tag = "6")]
    pub end_time: Option<Timestamp>,
    #[prost(message, optional, tag = "7")]
    pub attributes: Option<Attributes>,
    #[prost(message, optional, tag = "9")]
    pub time_events: Option<TimeEvents>,
    #[prost(message, optional, tag = "11")]
    pub status: Option<Status>,
    #[prost(enumeration = "SpanKind", tag = "14")]
    pub kind: i32,
}

impl Span {
    pub fn new(trace_id: u128, span_id: u64, name: &str) -> Self {
        Self {
            trace_id: trace_id.to_be_bytes().to_vec(),
            span_id: span_id.to_be_bytes().to_vec(),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Inserts an attribute, creating the attribute set if absent.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.attributes
            .get_or_insert_with(Attributes::default)
            .attribute_map
            .insert(key.into(), value);
    }
}

/// The record shape written to the stream.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SpanList {
    #[prost(message, repeated, tag = "1")]
    pub spans: Vec<Span>,
}

/// `oc-proto` codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct OcProto;

impl SpanCodec for OcProto {
    type Span = Span;

    const ENCODING: Encoding = Encoding::OcProto;

    fn routing_key(span: &Span) -> Result<Vec<u8>, WireError> {
        if span.trace_id.is_empty() {
            return Err(WireError::InvalidTraceId { len: 0 });
        }
        Ok(span.trace_id.clone())
    }

    fn encode(span: &Span) -> Result<Vec<u8>, WireError> {
        encode_message(span)
    }

    fn apply_dropped_marker(span: &mut Span, original_size: usize) {
        let attribute_map = BTreeMap::from([
            (DROPPED_KEY.to_string(), AttributeValue::bool(true)),
            (DROPPED_REASON_KEY.to_string(), AttributeValue::string(DROPPED_REASON)),
            (DROPPED_SIZE_KEY.to_string(), AttributeValue::int(original_size as i64)),
        ]);
        span.attributes = Some(Attributes {
            attribute_map,
            dropped_attributes_count: 0,
        });
        span.time_events = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn annotated_span(payload: usize) -> Span {
        let mut span = Span::new(0xfeed, 3, "upload");
        span.set_attribute("blob", AttributeValue::string(&"a".repeat(payload)));
        span.time_events = Some(TimeEvents {
            time_event: vec![TimeEvent {
                time: Some(Timestamp::from_unix_nanos(1)),
                value: Some(time_event::Value::Annotation(Annotation {
                    description: Some("b".repeat(payload).as_str().into()),
                    attributes: None,
                })),
            }],
            ..Default::default()
        });
        span
    }

    #[test]
    fn test_routing_key_is_raw_trace_id() {
        let span = Span::new(0x0102, 1, "op");
        let key = OcProto::routing_key(&span).unwrap();
        assert_eq!(key.len(), 16);
        assert_eq!(&key[14..], &[0x01, 0x02]);
    }

    #[test]
    fn test_empty_trace_id_is_rejected() {
        let span = Span::default();
        assert!(matches!(
            OcProto::routing_key(&span),
            Err(WireError::InvalidTraceId { len: 0 })
        ));
    }

    #[test]
    fn test_dropped_marker_replaces_attributes_and_clears_events() {
        let mut span = annotated_span(512);
        OcProto::apply_dropped_marker(&mut span, 4096);

        assert!(span.time_events.is_none());
        let attrs = span.attributes.as_ref().unwrap();
        assert_eq!(attrs.attribute_map.len(), 3);
        assert_eq!(attrs.attribute_map[DROPPED_KEY], AttributeValue::bool(true));
        assert_eq!(
            attrs.attribute_map[DROPPED_REASON_KEY],
            AttributeValue::string(DROPPED_REASON)
        );
        assert_eq!(attrs.attribute_map[DROPPED_SIZE_KEY], AttributeValue::int(4096));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = annotated_span(16);
        let mut b = annotated_span(16);
        b.set_attribute("blob", AttributeValue::string(&"a".repeat(16)));
        assert_eq!(OcProto::encode(&a).unwrap(), OcProto::encode(&b).unwrap());
    }

    #[test]
    fn test_encode_decodes_back() {
        let span = annotated_span(8);
        let encoded = OcProto::encode(&span).unwrap();
        assert_eq!(Span::decode(encoded.as_slice()).unwrap(), span);
    }

    #[test]
    fn test_attribute_map_keeps_typed_values() {
        let mut span = Span::new(0xabc, 2, "query");
        span.set_attribute("db.rows", AttributeValue::int(42));
        span.set_attribute("cache.hit", AttributeValue::bool(false));
        span.set_attribute("db.system", AttributeValue::string("postgres"));

        let decoded = Span::decode(OcProto::encode(&span).unwrap().as_slice()).unwrap();
        let attrs = decoded.attributes.unwrap().attribute_map;
        let keys: Vec<&str> = attrs.keys().map(String::as_str).collect();
        assert_eq!(keys, ["cache.hit", "db.rows", "db.system"]);
        assert_eq!(attrs["db.rows"], AttributeValue::int(42));
        assert_eq!(attrs["cache.hit"], AttributeValue::bool(false));
        assert_eq!(attrs["db.system"], AttributeValue::string("postgres"));
    }
}
