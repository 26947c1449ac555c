//! Microbenchmarks for the `push()` write path.
//!
//! Measures in-order appends, late arrivals that land mid-log, and batch
//! ingestion.
//!
//! Run with: `cargo bench -p featstore -- push`

#![allow(missing_docs)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use featstore::{Context, Event, Feature, Store, StoreConfig, aggregate};

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Creates a store with a single count feature and no TTL.
fn setup_store() -> Store {
    Store::new(StoreConfig {
        ttl: Duration::ZERO,
        features: vec![Feature::new("n", aggregate::count())],
        storage: None,
    })
    .unwrap()
}

/// Pre-fills one entity with `count` events, one per second.
fn prefill(store: &Store, entity: &str, count: i64) {
    let events = (0..count).map(|s| {
        Event::new(epoch() + chrono::Duration::seconds(s)).with("amount", 10.0)
    });
    store.push(&Context::background(), entity, events).unwrap();
}

fn bench_push_in_order(c: &mut Criterion) {
    let store = setup_store();
    let ctx = Context::background();
    let mut second = 0i64;

    c.bench_function("push/in_order", |b| {
        b.iter(|| {
            second += 1;
            let event = Event::new(epoch() + chrono::Duration::seconds(second)).with("amount", 42.5);
            store.push(&ctx, black_box("user"), [event]).unwrap();
        });
    });
}

fn bench_push_late_arrival(c: &mut Criterion) {
    let mut group = c.benchmark_group("push/late_arrival/log_len");

    for len in [100i64, 1_000, 10_000] {
        let store = setup_store();
        let ctx = Context::background();
        prefill(&store, "user", len);
        let middle = epoch() + chrono::Duration::seconds(len / 2);

        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| {
                let event = Event::new(middle).with("amount", 1.0);
                store.push(&ctx, black_box("user"), [event]).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_push_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("push/batch_size");

    for size in [10i64, 100, 1_000] {
        let store = setup_store();
        let ctx = Context::background();
        let mut offset = 0i64;

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                // Reverse order so the batch actually needs sorting
                let batch: Vec<Event> = (0..size)
                    .rev()
                    .map(|s| Event::new(epoch() + chrono::Duration::seconds(offset + s)))
                    .collect();
                offset += size;
                store.push(&ctx, black_box("user"), batch).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_push_many_entities(c: &mut Criterion) {
    let store = setup_store();
    let ctx = Context::background();
    let entities: Vec<String> = (0..1_000).map(|i| format!("user_{i}")).collect();
    let mut second = 0i64;

    c.bench_function("push/1000_entities_round_robin", |b| {
        b.iter(|| {
            second += 1;
            for entity in &entities {
                let event = Event::new(epoch() + chrono::Duration::seconds(second));
                store.push(&ctx, black_box(entity), [event]).unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_push_in_order,
    bench_push_late_arrival,
    bench_push_batch,
    bench_push_many_entities,
);
criterion_main!(benches);
