use prost::Message;
use shard_exporter::{
    partition_hash, ConfigError, ExportError, ExporterError, ExporterState, HashKeyRange,
    InMemoryBackend, JaegerExporter, OcExporter, Options, RawShard,
};
use span_wire::jaeger::{self, KeyValue, Log};
use span_wire::opencensus::{self, AttributeValue};
use span_wire::{Encoding, JaegerProto, SpanCodec, DROPPED_KEY, DROPPED_REASON, DROPPED_SIZE_KEY};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const HALF: u128 = 1 << 127;
const LOWER: &str = "shardId-000000000000";
const UPPER: &str = "shardId-000000000001";

fn two_halves() -> InMemoryBackend {
    InMemoryBackend::new(vec![
        RawShard::open(LOWER, HashKeyRange { start: 0, end: HALF - 1 }),
        RawShard::open(UPPER, HashKeyRange { start: HALF, end: u128::MAX }),
    ])
}

fn options() -> Options {
    Options::new("traces", "us-west-2")
}

/// First trace id, counting up from `from`, whose routing key hashes into
/// the lower (`true`) or upper half of the key space.
fn jaeger_trace_in_half(lower: bool, from: u128) -> u128 {
    (from..)
        .find(|&id| {
            let key = JaegerProto::routing_key(&jaeger::Span::new(id, 1, "lookup")).unwrap();
            (partition_hash(&key) < HALF) == lower
        })
        .unwrap()
}

fn jaeger_spans(backend: &InMemoryBackend, shard_id: &str) -> Vec<jaeger::Span> {
    backend
        .writer(shard_id)
        .unwrap()
        .records()
        .into_iter()
        .flat_map(|r| jaeger::SpanList::decode(r.data).unwrap().spans)
        .collect()
}

#[tokio::test]
async fn test_two_shard_routing_end_to_end() {
    let backend = two_halves();
    let exporter = JaegerExporter::new(options(), &backend).await.unwrap();

    let low = jaeger_trace_in_half(true, 1);
    let high = jaeger_trace_in_half(false, 1);
    for span_id in 1..=3 {
        exporter
            .export_span(jaeger::Span::new(low, span_id, "low"))
            .await
            .unwrap();
        exporter
            .export_span(jaeger::Span::new(high, span_id, "high"))
            .await
            .unwrap();
    }
    exporter.flush().await;

    let lower = jaeger_spans(&backend, LOWER);
    let upper = jaeger_spans(&backend, UPPER);
    assert_eq!(lower.len(), 3);
    assert_eq!(upper.len(), 3);
    assert!(lower.iter().all(|s| s.trace_id == low.to_be_bytes()));
    assert!(upper.iter().all(|s| s.trace_id == high.to_be_bytes()));

    for record in backend.writer(LOWER).unwrap().records() {
        assert_eq!(record.key.partition_key, "0");
        assert_eq!(record.key.explicit_hash_key, "0");
    }
    for record in backend.writer(UPPER).unwrap().records() {
        assert_eq!(record.key.partition_key, HALF.to_string());
        assert_eq!(record.key.partition_key, "170141183460469231731687303715884105728");
    }
}

#[tokio::test]
async fn test_spans_of_one_trace_share_a_shard() {
    let backend = InMemoryBackend::with_even_shards(8);
    let exporter = JaegerExporter::new(options(), &backend).await.unwrap();

    let traces: Vec<u128> = (0..16).map(|i| 0x5eed_0000_0000_0000_0000 + i * 7919).collect();
    for &trace in &traces {
        for span_id in 1..=5 {
            exporter
                .export_span(jaeger::Span::new(trace, span_id, "op"))
                .await
                .unwrap();
        }
    }
    exporter.flush().await;

    for &trace in &traces {
        let owners: Vec<String> = backend
            .writers()
            .keys()
            .filter(|shard_id| {
                jaeger_spans(&backend, shard_id)
                    .iter()
                    .any(|s| s.trace_id == trace.to_be_bytes())
            })
            .cloned()
            .collect();
        assert_eq!(owners.len(), 1, "trace {:x} spread over {:?}", trace, owners);

        let key = JaegerProto::routing_key(&jaeger::Span::new(trace, 1, "op")).unwrap();
        assert_eq!(owners[0], exporter.router().route(&key).unwrap().id);
        let spans = jaeger_spans(&backend, &owners[0]);
        assert_eq!(spans.iter().filter(|s| s.trace_id == trace.to_be_bytes()).count(), 5);
    }
}

#[tokio::test]
async fn test_opencensus_routes_on_raw_trace_id() {
    let backend = two_halves();
    let exporter = OcExporter::new(options().with_encoding(Encoding::OcProto), &backend)
        .await
        .unwrap();

    let mut span = opencensus::Span::new(0x0af7_6519_16cd_43dd_8448_eb21_1c80_319c, 1, "rpc");
    span.set_attribute("peer", AttributeValue::string("inventory"));
    let expected = if partition_hash(&span.trace_id) < HALF { LOWER } else { UPPER };
    exporter.export_span(span.clone()).await.unwrap();
    exporter.flush().await;

    let records = backend.writer(expected).unwrap().records();
    assert_eq!(records.len(), 1);
    let list = opencensus::SpanList::decode(records[0].data.clone()).unwrap();
    assert_eq!(list.spans, vec![span]);

    let other = if expected == LOWER { UPPER } else { LOWER };
    assert!(backend.writer(other).unwrap().records().is_empty());
}

#[tokio::test]
async fn test_failing_writer_does_not_fail_export() {
    let backend = InMemoryBackend::with_even_shards(2);
    let exporter = JaegerExporter::new(options(), &backend).await.unwrap();
    for writer in backend.writers().values() {
        writer.fail_puts("ProvisionedThroughputExceededException");
    }

    for trace in 1..=10u128 {
        assert_eq!(
            exporter.export_span(jaeger::Span::new(trace, 1, "doomed")).await,
            Ok(())
        );
    }
    exporter.flush().await;

    let shard_metrics = exporter.shard_metrics();
    let failed: u64 = shard_metrics.values().map(|m| m.spans_failed).sum();
    let put_failures: u64 = shard_metrics.values().map(|m| m.put_failures).sum();
    assert_eq!(failed, 10);
    assert!(put_failures >= 1);
    assert_eq!(exporter.metrics().spans_dequeued(), 10);
    assert!(backend.writers().values().all(|w| w.records().is_empty()));
}

#[tokio::test]
async fn test_oversized_span_is_replaced_by_marker() {
    let backend = two_halves();
    let limit = 4096;
    let exporter = JaegerExporter::new(options().with_max_allowed_size_per_span(limit), &backend)
        .await
        .unwrap();

    let trace = jaeger_trace_in_half(true, 100);
    let mut span = jaeger::Span::new(trace, 9, "upload");
    span.tags.push(KeyValue::string("body", "b".repeat(limit)));
    span.logs.push(Log {
        timestamp: None,
        fields: vec![KeyValue::string("dump", "d".repeat(limit / 2))],
    });
    let original_size = JaegerProto::encode(&span).unwrap().len();

    exporter.export_span(span).await.unwrap();
    exporter.flush().await;

    let spans = jaeger_spans(&backend, LOWER);
    assert_eq!(spans.len(), 1);
    let marked = &spans[0];
    assert_eq!(marked.operation_name, "upload");
    assert!(marked.logs.is_empty());
    assert_eq!(marked.tags.len(), 3);
    assert!(marked.tags.iter().any(|t| t.key == DROPPED_KEY && t.v_bool));
    assert!(marked.tags.iter().any(|t| t.v_str == DROPPED_REASON));
    assert!(marked
        .tags
        .iter()
        .any(|t| t.key == DROPPED_SIZE_KEY && t.v_int64 == original_size as i64));
    assert!(JaegerProto::encode(marked).unwrap().len() <= limit);

    assert_eq!(exporter.metrics().xl_spans_dropped(), 1);
    assert_eq!(exporter.shard_metrics()[LOWER].xl_spans_dropped, 1);
    assert_eq!(exporter.metrics().xl_bytes_dropped(), original_size as u64);
    assert_eq!(exporter.shard_metrics()[LOWER].xl_bytes_dropped, original_size as u64);
}

#[tokio::test]
async fn test_flush_stops_each_writer_once_and_blocks_later_exports() {
    let backend = InMemoryBackend::with_even_shards(4);
    let exporter = JaegerExporter::new(options(), &backend).await.unwrap();

    for trace in 1..=200u128 {
        exporter
            .export_span(jaeger::Span::new(trace, 1, "op"))
            .await
            .unwrap();
    }
    exporter.flush().await;
    assert_eq!(exporter.state(), ExporterState::Stopped);

    let delivered: usize = backend
        .writers()
        .keys()
        .map(|id| jaeger_spans(&backend, id).len())
        .sum();
    assert_eq!(delivered, 200);

    assert_eq!(
        exporter.export_span(jaeger::Span::new(1, 2, "late")).await,
        Err(ExportError::ShutDown)
    );
    exporter.flush().await;

    for writer in backend.writers().values() {
        assert_eq!(writer.start_calls(), 1);
        assert_eq!(writer.stop_calls(), 1);
        assert_eq!(writer.puts_after_stop(), 0);
    }
    let after: usize = backend
        .writers()
        .keys()
        .map(|id| jaeger_spans(&backend, id).len())
        .sum();
    assert_eq!(after, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_flush_waits_for_in_flight_exports() {
    let backend = InMemoryBackend::with_even_shards(2);
    let mut opts = options().with_max_list_size(1).with_queue_size(1);
    opts.max_concurrent_exports = Some(8);
    let exporter = JaegerExporter::new(opts, &backend).await.unwrap();
    for writer in backend.writers().values() {
        writer.delay_puts(Duration::from_millis(2));
    }

    for trace in 1..=40u128 {
        exporter
            .export_span(jaeger::Span::new(trace, 1, "slow"))
            .await
            .unwrap();
    }
    exporter.flush().await;

    assert_eq!(exporter.in_flight(), 0);
    assert_eq!(exporter.metrics().spans_dequeued(), 40);
    assert_eq!(exporter.metrics().submit_errors(), 0);
    let put: u64 = exporter.shard_metrics().values().map(|m| m.spans_put).sum();
    assert_eq!(put, 40);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_admission_gate_bounds_concurrent_exports() {
    for capacity in 1..=4usize {
        let backend = InMemoryBackend::with_even_shards(2);
        let opts = options()
            .with_max_concurrent_exports(capacity)
            .with_max_list_size(1)
            .with_queue_size(1);
        let exporter = Arc::new(JaegerExporter::new(opts, &backend).await.unwrap());
        for writer in backend.writers().values() {
            writer.delay_puts(Duration::from_millis(1));
        }

        let done = Arc::new(AtomicBool::new(false));
        let peak = Arc::new(AtomicUsize::new(0));
        let sampler = {
            let exporter = Arc::clone(&exporter);
            let done = Arc::clone(&done);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                while !done.load(Ordering::Acquire) {
                    peak.fetch_max(exporter.admission().in_flight(), Ordering::AcqRel);
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut producers = Vec::new();
        for p in 0..4u128 {
            let exporter = Arc::clone(&exporter);
            producers.push(tokio::spawn(async move {
                for i in 0..8u128 {
                    exporter
                        .export_span(jaeger::Span::new(p * 1000 + i + 1, 1, "burst"))
                        .await
                        .unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        exporter.flush().await;
        done.store(true, Ordering::Release);
        sampler.await.unwrap();

        let peak = peak.load(Ordering::Acquire);
        assert!(peak <= capacity, "peak {} exceeds capacity {}", peak, capacity);
        assert_eq!(exporter.admission().capacity(), Some(capacity));
        assert_eq!(exporter.metrics().spans_dequeued(), 32);
    }
}

#[tokio::test]
async fn test_startup_errors_are_returned() {
    let backend = InMemoryBackend::with_even_shards(2);

    let err = JaegerExporter::new(Options::new("traces", ""), &backend)
        .await
        .unwrap_err();
    assert!(matches!(err, ExporterError::Config(ConfigError::MissingRegion)));

    let mut bad_encoding = options();
    bad_encoding.encoding = Some("zipkin".to_string());
    let err = JaegerExporter::new(bad_encoding, &backend).await.unwrap_err();
    assert!(matches!(err, ExporterError::Config(ConfigError::UnknownEncoding(_))));
    assert_eq!(backend.list_calls(), 0);

    let empty = InMemoryBackend::new(Vec::new());
    let err = JaegerExporter::new(options(), &empty).await.unwrap_err();
    assert!(matches!(err, ExporterError::Discovery(_)));

    let broken = InMemoryBackend::with_even_shards(2);
    broken.fail_writer_creation(UPPER, "AccessDenied");
    let err = JaegerExporter::new(options(), &broken).await.unwrap_err();
    assert!(matches!(err, ExporterError::WriterSetup { ref shard_id, .. } if shard_id == UPPER));
    assert!(broken.writers().values().all(|w| w.start_calls() == 0));
}

#[tokio::test]
async fn test_closed_parent_shards_get_no_writer() {
    let mut shards = vec![
        RawShard::open(LOWER, HashKeyRange { start: 0, end: HALF - 1 }),
        RawShard::open(UPPER, HashKeyRange { start: HALF, end: u128::MAX }),
    ];
    shards.push(RawShard {
        ending_sequence_number: Some("49579844037727333356165064238440708846556371693205002258".to_string()),
        ..RawShard::open("shardId-parent", HashKeyRange { start: 0, end: u128::MAX })
    });
    let backend = InMemoryBackend::new(shards).with_page_size(1);

    let exporter = JaegerExporter::new(options(), &backend).await.unwrap();
    assert_eq!(exporter.directory().len(), 2);
    assert!(backend.writer("shardId-parent").is_none());
    assert_eq!(backend.list_calls(), 3);
    exporter.flush().await;
}
