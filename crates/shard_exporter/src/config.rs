//! Exporter configuration.
//!
//! [`Options`] is the user-facing, serde-deserializable shape where zero or
//! empty means "use the default". [`Options::resolve`] validates it and
//! applies defaults exactly once, producing the immutable [`ExporterConfig`]
//! the exporter is built from.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use span_wire::Encoding;
use std::time::Duration;

/// Default maximum encoded size of a single span (bytes).
pub const DEFAULT_MAX_ALLOWED_SIZE_PER_SPAN: usize = 900_000;
/// Default capacity of each shard writer's queue (spans).
pub const DEFAULT_QUEUE_SIZE: usize = 100_000;
/// Default span-list size that triggers a flush (bytes).
pub const DEFAULT_MAX_LIST_SIZE: usize = 100_000;
/// Default span-list flush interval (seconds).
pub const DEFAULT_LIST_FLUSH_INTERVAL_SECS: u64 = 5;
/// Default metrics label.
pub const DEFAULT_NAME: &str = "kinesis";

/// Raw exporter options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    /// Label attached to metrics and logs
    pub name: String,
    pub stream_name: String,
    pub aws_region: String,
    /// Role to assume for stream access
    pub aws_role: Option<String>,
    /// Endpoint override, e.g. a local stream emulator
    pub aws_kinesis_endpoint: Option<String>,
    /// `jaeger-proto` (default) or `oc-proto`
    pub encoding: Option<String>,
    pub max_allowed_size_per_span: usize,
    pub queue_size: usize,
    pub max_list_size: usize,
    /// Seconds between span-list flushes
    pub list_flush_interval: u64,
    pub kpl_aggregate_batch_count: usize,
    pub kpl_aggregate_batch_size: usize,
    pub kpl_batch_size: usize,
    pub kpl_batch_count: usize,
    pub kpl_backlog_count: usize,
    pub kpl_flush_interval_seconds: u64,
    pub kpl_max_connections: usize,
    pub kpl_max_retries: usize,
    pub kpl_max_backoff_seconds: u64,
    /// Upper bound on in-flight export tasks; unset or 0 means unbounded
    pub max_concurrent_exports: Option<usize>,
}

impl Options {
    /// Creates options for a stream in a region, everything else defaulted.
    pub fn new(stream_name: impl Into<String>, aws_region: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            aws_region: aws_region.into(),
            ..Default::default()
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding.as_str().to_string());
        self
    }

    pub fn with_max_allowed_size_per_span(mut self, bytes: usize) -> Self {
        self.max_allowed_size_per_span = bytes;
        self
    }

    pub fn with_max_concurrent_exports(mut self, limit: usize) -> Self {
        self.max_concurrent_exports = Some(limit);
        self
    }

    pub fn with_max_list_size(mut self, bytes: usize) -> Self {
        self.max_list_size = bytes;
        self
    }

    pub fn with_list_flush_interval(mut self, secs: u64) -> Self {
        self.list_flush_interval = secs;
        self
    }

    pub fn with_queue_size(mut self, spans: usize) -> Self {
        self.queue_size = spans;
        self
    }

    /// Validates the options and applies defaults.
    pub fn resolve(self) -> Result<ExporterConfig, ConfigError> {
        if self.aws_region.is_empty() {
            return Err(ConfigError::MissingRegion);
        }
        if self.stream_name.is_empty() {
            return Err(ConfigError::MissingStreamName);
        }

        let encoding = match self.encoding.as_deref() {
            None | Some("") => Encoding::default(),
            Some(name) => name.parse()?,
        };

        Ok(ExporterConfig {
            name: non_empty(self.name).unwrap_or_else(|| DEFAULT_NAME.to_string()),
            target: StreamTarget {
                stream_name: self.stream_name,
                aws: AwsConfig {
                    region: self.aws_region,
                    role_arn: self.aws_role.and_then(non_empty),
                    endpoint: self.aws_kinesis_endpoint.and_then(non_empty),
                },
            },
            encoding,
            max_allowed_size_per_span: or_default(
                self.max_allowed_size_per_span,
                DEFAULT_MAX_ALLOWED_SIZE_PER_SPAN,
            ),
            list: ListConfig {
                queue_size: or_default(self.queue_size, DEFAULT_QUEUE_SIZE),
                max_list_size: or_default(self.max_list_size, DEFAULT_MAX_LIST_SIZE),
                flush_interval: Duration::from_secs(or_default(
                    self.list_flush_interval,
                    DEFAULT_LIST_FLUSH_INTERVAL_SECS,
                )),
            },
            producer: ProducerConfig {
                aggregate_batch_count: self.kpl_aggregate_batch_count,
                aggregate_batch_size: self.kpl_aggregate_batch_size,
                batch_size: self.kpl_batch_size,
                batch_count: self.kpl_batch_count,
                backlog_count: self.kpl_backlog_count,
                flush_interval: Duration::from_secs(self.kpl_flush_interval_seconds),
                max_connections: self.kpl_max_connections,
                max_retries: self.kpl_max_retries,
                max_backoff: Duration::from_secs(self.kpl_max_backoff_seconds),
            },
            max_concurrent_exports: self.max_concurrent_exports.filter(|&n| n > 0),
        })
    }
}

fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() {
        default
    } else {
        value
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Validated configuration snapshot. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub name: String,
    pub target: StreamTarget,
    pub encoding: Encoding,
    pub max_allowed_size_per_span: usize,
    pub list: ListConfig,
    pub producer: ProducerConfig,
    pub max_concurrent_exports: Option<usize>,
}

/// Which stream to write to and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub stream_name: String,
    pub aws: AwsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    pub region: String,
    pub role_arn: Option<String>,
    pub endpoint: Option<String>,
}

/// Span-list batching done by each shard writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListConfig {
    /// Capacity of the shard writer's queue
    pub queue_size: usize,
    /// Flush once a list reaches this many bytes
    pub max_list_size: usize,
    /// Flush at least this often
    pub flush_interval: Duration,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            max_list_size: DEFAULT_MAX_LIST_SIZE,
            flush_interval: Duration::from_secs(DEFAULT_LIST_FLUSH_INTERVAL_SECS),
        }
    }
}

/// Parameters forwarded untouched to the external stream writer.
///
/// Zero means "the writer's own default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerConfig {
    pub aggregate_batch_count: usize,
    pub aggregate_batch_size: usize,
    pub batch_size: usize,
    pub batch_count: usize,
    pub backlog_count: usize,
    pub flush_interval: Duration,
    pub max_connections: usize,
    pub max_retries: usize,
    pub max_backoff: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use span_wire::UnknownEncoding;

    #[test]
    fn test_resolve_applies_defaults() {
        let config = Options::new("spans", "us-west-2").resolve().unwrap();

        assert_eq!(config.name, DEFAULT_NAME);
        assert_eq!(config.encoding, Encoding::JaegerProto);
        assert_eq!(config.max_allowed_size_per_span, 900_000);
        assert_eq!(config.list, ListConfig::default());
        assert_eq!(config.max_concurrent_exports, None);
        assert_eq!(config.target.aws.role_arn, None);
    }

    #[test]
    fn test_missing_region_fails_first() {
        let err = Options::default().resolve().unwrap_err();
        assert_eq!(err, ConfigError::MissingRegion);
    }

    #[test]
    fn test_missing_stream_name() {
        let err = Options::new("", "eu-central-1").resolve().unwrap_err();
        assert_eq!(err, ConfigError::MissingStreamName);
    }

    #[test]
    fn test_unknown_encoding() {
        let mut options = Options::new("spans", "us-east-1");
        options.encoding = Some("thrift".to_string());
        assert_eq!(
            options.resolve().unwrap_err(),
            ConfigError::UnknownEncoding(UnknownEncoding("thrift".to_string()))
        );
    }

    #[test]
    fn test_zero_concurrency_limit_is_unbounded() {
        let config = Options::new("spans", "us-east-1")
            .with_max_concurrent_exports(0)
            .resolve()
            .unwrap();
        assert_eq!(config.max_concurrent_exports, None);

        let config = Options::new("spans", "us-east-1")
            .with_max_concurrent_exports(16)
            .resolve()
            .unwrap();
        assert_eq!(config.max_concurrent_exports, Some(16));
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{
            "stream_name": "traces",
            "aws_region": "ap-south-1",
            "aws_role": "arn:aws:iam::123456789012:role/writer",
            "encoding": "oc-proto",
            "list_flush_interval": 1,
            "kpl_max_retries": 10,
            "max_concurrent_exports": 64
        }"#;
        let options: Options = serde_json::from_str(json).unwrap();
        let config = options.resolve().unwrap();

        assert_eq!(config.encoding, Encoding::OcProto);
        assert_eq!(config.list.flush_interval, Duration::from_secs(1));
        assert_eq!(config.producer.max_retries, 10);
        assert_eq!(config.max_concurrent_exports, Some(64));
        assert_eq!(
            config.target.aws.role_arn.as_deref(),
            Some("arn:aws:iam::123456789012:role/writer")
        );
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let json = r#"{ "stream_name": "traces", "num_shards": 4 }"#;
        assert!(serde_json::from_str::<Options>(json).is_err());
    }
}
