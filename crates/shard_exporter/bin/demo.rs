//! Shard-aware exporter demo against the in-memory stream.
//!
//! Generates traces from several concurrent producers, mixes in a few
//! oversized spans, then flushes and prints per-shard results.
//!
//! Run with: `RUST_LOG=shard_exporter=debug cargo run -p shard_exporter --bin demo`

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shard_exporter::{InMemoryBackend, JaegerExporter, Options};
use span_wire::jaeger::{self, KeyValue, Log};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

const SHARDS: usize = 4;
const PRODUCERS: usize = 4;
const TRACES_PER_PRODUCER: usize = 250;
const SPANS_PER_TRACE: u64 = 4;
const MAX_SPAN_SIZE: usize = 16 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Shard-Aware Exporter Demo ===\n");

    let backend = InMemoryBackend::with_even_shards(SHARDS).with_page_size(2);
    let options = Options::new("demo-spans", "us-west-2")
        .with_max_allowed_size_per_span(MAX_SPAN_SIZE)
        .with_max_concurrent_exports(64)
        .with_max_list_size(64 * 1024)
        .with_list_flush_interval(1);

    let exporter = Arc::new(JaegerExporter::new(options, &backend).await?);
    for shard in exporter.directory().shards() {
        println!("  {} owns {}", shard.id, shard.range);
    }
    println!();

    let started = Instant::now();
    let mut producers = JoinSet::new();
    for producer_id in 0..PRODUCERS {
        let exporter = Arc::clone(&exporter);
        producers.spawn(async move {
            let mut rng = StdRng::seed_from_u64(producer_id as u64);
            let mut sent = 0u64;
            for _ in 0..TRACES_PER_PRODUCER {
                let trace_id: u128 = rng.gen();
                for span_id in 0..SPANS_PER_TRACE {
                    // Roughly one span in a hundred blows the size limit
                    let payload = if rng.gen_ratio(1, 100) {
                        MAX_SPAN_SIZE * 3 / 2
                    } else {
                        rng.gen_range(16..512)
                    };
                    let span = make_span(trace_id, span_id, producer_id, payload);
                    if exporter.export_span(span).await.is_ok() {
                        sent += 1;
                    }
                }
            }
            sent
        });
    }

    let mut sent = 0u64;
    while let Some(joined) = producers.join_next().await {
        sent += joined?;
    }
    exporter.flush().await;
    let elapsed = started.elapsed();

    println!("Exported {} spans in {:?}\n", sent, elapsed);
    println!(
        "Exporter metrics: {}",
        serde_json::to_string_pretty(&exporter.metrics().snapshot())?
    );
    println!("\nPer shard:");
    for (shard_id, metrics) in exporter.shard_metrics() {
        let writer = backend.writer(&shard_id).ok_or("missing writer")?;
        println!(
            "  {}: {} spans in {} lists ({} bytes), {} oversized, stopped {}x",
            shard_id,
            metrics.spans_put,
            metrics.lists_put,
            metrics.bytes_put,
            metrics.xl_spans_dropped,
            writer.stop_calls()
        );
    }

    println!("\n=== Demo complete ===");
    Ok(())
}

fn make_span(trace_id: u128, span_id: u64, producer_id: usize, payload: usize) -> jaeger::Span {
    let name = format!("producer-{}/op-{}", producer_id, span_id);
    let mut span = jaeger::Span::new(trace_id, span_id + 1, name);
    span.tags.push(KeyValue::string("component", "demo"));
    span.tags.push(KeyValue::int64("producer", producer_id as i64));
    span.logs.push(Log {
        timestamp: None,
        fields: vec![KeyValue::string("message", "x".repeat(payload))],
    });
    span
}
