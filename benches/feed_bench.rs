//! Feed Hot-Path Benchmarks — Per-Frame Processing Cost
//!
//! Benchmarks the work done for every market-channel frame: JSON
//! normalization, history retention, arbitrage detection and the full
//! `handle_text` path including publishing.
//!
//! Run with: cargo bench --bench feed_bench

use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use polymarket_paper_trader::adapters::feeds::normalize::normalize;
use polymarket_paper_trader::adapters::feeds::PriceFeed;
use polymarket_paper_trader::adapters::metrics::MetricsRegistry;
use polymarket_paper_trader::config::FeedConfig;
use polymarket_paper_trader::domain::{ArbitrageSignal, PriceRing, PriceSample};

const NESTED_FRAME: &str =
    r#"{"asset_id":"tok1","yes":{"best_bid":"0.44","best_ask":"0.46"},"no":{"best_bid":"0.49","best_ask":"0.51"}}"#;
const BATCH_FRAME: &str = r#"[{"market":"m1","yes_price":"0.4","no_price":"0.5"},{"market":"m2","yes_bid":0.3,"yes_ask":0.32,"no_bid":0.6,"no_ask":0.62},{"type":"subscribed"}]"#;

fn sample(i: i64) -> PriceSample {
    PriceSample {
        instrument_id: "tok1".to_string(),
        timestamp: Utc::now(),
        yes_mid: Decimal::new(40 + i % 10, 2),
        no_mid: Decimal::new(55, 2),
    }
}

/// Benchmark normalization of single and batched frames.
fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_nested_frame", |b| {
        b.iter(|| normalize(black_box(NESTED_FRAME)));
    });
    c.bench_function("normalize_batch_frame", |b| {
        b.iter(|| normalize(black_box(BATCH_FRAME)));
    });
}

/// Benchmark bounded history push at capacity.
fn bench_ring_push(c: &mut Criterion) {
    let mut ring = PriceRing::with_capacity(100);
    for i in 0..100 {
        ring.push(sample(i));
    }

    let mut i = 0;
    c.bench_function("price_ring_push_full", |b| {
        b.iter(|| {
            i += 1;
            ring.push(black_box(sample(i)));
        });
    });
}

/// Benchmark arbitrage detection on a qualifying sample.
fn bench_arbitrage_detect(c: &mut Criterion) {
    let threshold = Decimal::new(99, 2);
    let sample = sample(0);
    c.bench_function("arbitrage_detect", |b| {
        b.iter(|| ArbitrageSignal::detect(black_box(&sample), black_box(threshold)));
    });
}

/// Benchmark the full per-frame path through the feed.
fn bench_handle_text(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (events_tx, mut events_rx) = mpsc::channel(1024);
    let metrics = Arc::new(MetricsRegistry::new().unwrap());
    let feed = PriceFeed::new(&FeedConfig::default(), events_tx, metrics);

    // Keep the queue drained so the benchmark measures publishing, not drops.
    runtime.spawn(async move { while events_rx.recv().await.is_some() {} });

    c.bench_function("feed_handle_text", |b| {
        b.to_async(&runtime).iter(|| feed.handle_text(black_box(NESTED_FRAME)));
    });
}

criterion_group!(
    benches,
    bench_normalize,
    bench_ring_push,
    bench_arbitrage_detect,
    bench_handle_text,
);
criterion_main!(benches);
