//! Integration tests for the full store lifecycle.
//!
//! These tests drive the public API end to end: configuration, ingestion,
//! live and historical queries, batch queries, eviction and shutdown.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use featstore::error::{EventError, StorageOp};
use featstore::{
    Context, Event, FeatError, Feature, FeatureSetConfig, Lifetime, Sliding, Store, StoreConfig,
    Value, aggregate,
};

const HOUR: Duration = Duration::from_secs(3600);

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn ago(minutes: i64) -> DateTime<Utc> {
    now() - chrono::Duration::minutes(minutes)
}

fn store_with(ttl: Duration, features: Vec<Feature>) -> Store {
    Store::new(StoreConfig {
        ttl,
        features,
        storage: None,
    })
    .unwrap()
}

#[test]
fn test_push_then_get_counts_and_sums() {
    let store = store_with(
        Duration::ZERO,
        vec![
            Feature::new("count", aggregate::count()),
            Feature::new("sum", aggregate::sum("amount")),
        ],
    );
    let ctx = Context::background();
    let t = Utc::now();

    store
        .push(
            &ctx,
            "user1",
            [
                Event::new(t - chrono::Duration::seconds(1)).with("amount", 200.0),
                Event::new(t).with("amount", 100.0),
            ],
        )
        .unwrap();

    let features = store.get(&ctx, "user1").unwrap();
    assert_eq!(features.int("count"), Ok(2));
    assert_eq!(features.float("sum"), Ok(300.0));
}

#[test]
fn test_sliding_window_selects_recent_events() {
    let store = store_with(
        Duration::ZERO,
        vec![
            Feature::new("count_1h", aggregate::count()).with_window(Sliding::new(HOUR)),
            Feature::new("count_all", aggregate::count()),
        ],
    );
    let ctx = Context::background();
    store
        .push(&ctx, "user1", [120, 90, 30, 0].map(|m| Event::new(ago(m))))
        .unwrap();

    let features = store.get_at(&ctx, "user1", now()).unwrap();
    assert_eq!(features.int("count_1h"), Ok(2));
    assert_eq!(features.int("count_all"), Ok(4));
}

#[test]
fn test_ttl_and_future_are_both_excluded() {
    let store = store_with(HOUR, vec![Feature::new("count", aggregate::count())]);
    let ctx = Context::background();
    store
        .push(
            &ctx,
            "user1",
            [
                Event::new(ago(120)),
                Event::new(ago(30)),
                Event::new(now()),
                Event::new(now() + chrono::Duration::hours(1)),
            ],
        )
        .unwrap();

    let features = store.get_at(&ctx, "user1", now()).unwrap();
    assert_eq!(features.int("count"), Ok(2));
}

#[test]
fn test_point_in_time_with_sliding_window() {
    let store = store_with(
        Duration::ZERO,
        vec![Feature::new("count", aggregate::count()).with_window(Sliding::new(HOUR))],
    );
    let ctx = Context::background();
    store
        .push(
            &ctx,
            "user1",
            [
                Event::new(ago(120)),
                Event::new(ago(30)),
                Event::new(now()),
                Event::new(now() + chrono::Duration::hours(1)),
            ],
        )
        .unwrap();

    assert_eq!(store.get_at(&ctx, "user1", now()).unwrap().int("count"), Ok(2));
    assert_eq!(store.get_at(&ctx, "user1", ago(60)).unwrap().int("count"), Ok(1));
}

#[test]
fn test_distinct_countries() {
    let store = store_with(
        Duration::ZERO,
        vec![Feature::new("countries", aggregate::count_distinct("country"))],
    );
    let ctx = Context::background();
    let events = ["US", "CA", "US", "MX", "CA"]
        .iter()
        .zip((0i64..).map(ago))
        .map(|(country, at)| Event::new(at).with("country", *country));
    store.push(&ctx, "user1", events).unwrap();

    assert_eq!(store.get_at(&ctx, "user1", now()).unwrap().int("countries"), Ok(3));
}

#[test]
fn test_velocity_over_observed_span() {
    let store = store_with(
        Duration::ZERO,
        vec![Feature::new("velocity", aggregate::velocity(HOUR))],
    );
    let ctx = Context::background();
    let start = ago(5);
    store
        .push(
            &ctx,
            "user1",
            [0, 1, 2, 3, 5].map(|m| Event::new(start + chrono::Duration::minutes(m))),
        )
        .unwrap();

    let velocity = store.get_at(&ctx, "user1", now()).unwrap().float("velocity").unwrap();
    assert!((velocity - 1.0).abs() < 1e-9, "velocity = {velocity}");
}

#[test]
fn test_non_utc_push_is_rejected_atomically() {
    let store = store_with(Duration::ZERO, vec![Feature::new("count", aggregate::count())]);
    let ctx = Context::background();
    let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();

    let err = store
        .push(
            &ctx,
            "user1",
            [
                Event::new(now()),
                Event::new(now()),
                Event::with_offset(now().with_timezone(&tokyo), Default::default()),
            ],
        )
        .unwrap_err();

    assert!(matches!(
        err,
        FeatError::Event(EventError::NonUtcTimestamp { index: 2, .. })
    ));
    assert_eq!(store.get_at(&ctx, "user1", now()).unwrap().int("count"), Ok(0));
    assert_eq!(store.stats(&ctx).unwrap().total_event_count, 0);
}

#[test]
fn test_batch_get_at() {
    let store = store_with(
        Duration::ZERO,
        vec![Feature::new("spent", aggregate::sum("amount"))],
    );
    let ctx = Context::background();
    store
        .push(&ctx, "alice", [Event::new(ago(10)).with("amount", 10)])
        .unwrap();
    store
        .push(
            &ctx,
            "bob",
            [
                Event::new(ago(10)).with("amount", 5),
                Event::new(ago(5)).with("amount", 7),
            ],
        )
        .unwrap();

    let results = store
        .batch_get_at(&ctx, ["alice", "bob", "carol"], now())
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results["alice"].float("spent"), Ok(10.0));
    assert_eq!(results["bob"].float("spent"), Ok(12.0));
    assert_eq!(results["carol"].float("spent"), Ok(0.0));
}

#[test]
fn test_batch_get_with_owned_ids() {
    let store = store_with(Duration::ZERO, vec![Feature::new("n", aggregate::count())]);
    let ctx = Context::background();
    let ids: Vec<String> = (0..5).map(|i| format!("user_{i}")).collect();
    for id in &ids {
        store.push(&ctx, id, [Event::new(Utc::now())]).unwrap();
    }

    let results = store.batch_get(&ctx, &ids).unwrap();
    assert_eq!(results.len(), 5);
    assert!(results.values().all(|f| f.int("n") == Ok(1)));
}

#[test]
fn test_evict_removes_expired_events() {
    let store = store_with(HOUR, vec![Feature::new("count", aggregate::count())]);
    let ctx = Context::background();
    let wall = Utc::now();
    store
        .push(
            &ctx,
            "user1",
            [
                Event::new(wall - chrono::Duration::hours(3)),
                Event::new(wall - chrono::Duration::hours(2)),
                Event::new(wall - chrono::Duration::minutes(10)),
            ],
        )
        .unwrap();
    assert_eq!(store.stats(&ctx).unwrap().total_event_count, 3);

    store.evict(&ctx).unwrap();

    let stats = store.stats(&ctx).unwrap();
    assert_eq!(stats.entity_count, 1);
    assert_eq!(stats.total_event_count, 1);
    assert_eq!(store.get(&ctx, "user1").unwrap().int("count"), Ok(1));
}

#[test]
fn test_late_events_are_ordered() {
    let store = store_with(
        Duration::ZERO,
        vec![
            Feature::new("last_amount", aggregate::last("amount")),
            Feature::new("age", aggregate::time_since_first()),
        ],
    );
    let ctx = Context::background();

    store.push(&ctx, "u", [Event::new(ago(10)).with("amount", 1)]).unwrap();
    store.push(&ctx, "u", [Event::new(ago(1)).with("amount", 3)]).unwrap();
    // Arrives late but belongs in the middle
    store.push(&ctx, "u", [Event::new(ago(5)).with("amount", 2)]).unwrap();

    let features = store.get_at(&ctx, "u", now()).unwrap();
    assert_eq!(features.get("last_amount"), Some(&Value::Int(3)));
    assert_eq!(features.duration("age"), Ok(Duration::from_secs(9 * 60)));

    let features = store.get_at(&ctx, "u", ago(3)).unwrap();
    assert_eq!(features.get("last_amount"), Some(&Value::Int(2)));
}

#[test]
fn test_close_is_final() {
    let store = store_with(Duration::ZERO, vec![Feature::new("n", aggregate::count())]);
    let ctx = Context::background();
    store.push(&ctx, "u", [Event::new(now())]).unwrap();

    store.close().unwrap();
    store.close().unwrap();

    let err = store.get_at(&ctx, "u", now()).unwrap_err();
    assert!(matches!(err, FeatError::Storage { op: StorageOp::Get, .. }));
}

#[test]
fn test_store_from_feature_set_json() {
    let config: FeatureSetConfig = serde_json::from_str(
        r#"{
            "ttl": 86400.0,
            "features": [
                { "name": "tx_count_5min",
                  "aggregate": { "kind": "count" },
                  "window": { "kind": "sliding", "duration": 300.0 } },
                { "name": "p90_amount",
                  "aggregate": { "kind": "percentile", "field": "amount", "p": 0.9 } },
                { "name": "amount_spread",
                  "aggregate": { "kind": "std_dev", "field": "amount" },
                  "window": { "kind": "lifetime" } }
            ]
        }"#,
    )
    .unwrap();
    config.validate().unwrap();
    let store = Store::new(config.into_store_config()).unwrap();
    assert_eq!(store.ttl(), Duration::from_secs(86_400));

    let ctx = Context::background();
    let amounts = [10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0];
    let events = amounts
        .iter()
        .enumerate()
        .map(|(i, &amount)| {
            let minutes = i64::try_from(i).unwrap();
            Event::new(ago(30 - minutes)).with("amount", amount)
        });
    store.push(&ctx, "u", events).unwrap();

    let features = store.get_at(&ctx, "u", now()).unwrap();
    assert_eq!(features.int("tx_count_5min"), Ok(0));
    assert_eq!(features.float("p90_amount"), Ok(90.0));
    let spread = features.float("amount_spread").unwrap();
    assert!((spread - 28.722_813_232_690_143).abs() < 1e-9);
}

#[test]
fn test_features_accessor_reports_default_windows() {
    let store = store_with(
        Duration::ZERO,
        vec![
            Feature::new("a", aggregate::count()),
            Feature::new("b", aggregate::count()).with_window(Lifetime),
        ],
    );
    let names: Vec<&str> = store.features().iter().map(Feature::name).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(store.features().iter().all(|f| f.window().is_some()));
}
