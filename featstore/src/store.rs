//! Store orchestrator: binds named features to entity event logs.
//!
//! The [`Store`] validates events on the way in, hands them to a
//! [`Storage`] backend, and on every query evaluates each configured
//! feature over the entity's history as of a reference instant.
//!
//! # Point-in-time correctness
//!
//! A query at instant `at` only ever sees events with `instant <= at`:
//!
//! 1. the backend read is bounded by `at`
//! 2. the store re-applies that bound, so a custom backend that returns too
//!    much cannot leak future events
//! 3. with a TTL, events older than `at - ttl` are dropped, measured from
//!    `at` rather than the wall clock
//! 4. each feature's window selects from what is left, against `at`
//!
//! # Example Usage
//!
//! ```rust
//! use std::time::Duration;
//! use chrono::Utc;
//! use featstore::{aggregate, Context, Event, Feature, Sliding, Store, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new(StoreConfig {
//!     ttl: Duration::from_secs(7 * 24 * 3600),
//!     features: vec![
//!         Feature::new("txn_count_1h", aggregate::count())
//!             .with_window(Sliding::new(Duration::from_secs(3600))),
//!         Feature::new("total_spent", aggregate::sum("amount")),
//!     ],
//!     storage: None,
//! })?;
//!
//! let ctx = Context::background();
//! let now = Utc::now();
//! store.push(&ctx, "user_1", [Event::new(now).with("amount", 120.0)])?;
//!
//! let features = store.get_at(&ctx, "user_1", now)?;
//! assert_eq!(features.int("txn_count_1h")?, 1);
//! assert_eq!(features.float("total_spent")?, 120.0);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::aggregate::AggregatorFactory;
use crate::context::Context;
use crate::error::{ConfigError, EventError, FeatError, Result, StorageError, StorageOp};
use crate::event::Event;
use crate::feature::{Feature, validate_names};
use crate::result::FeatureVector;
use crate::storage::{MemoryStorage, Storage, StorageStats, cutoff_before};
use crate::window::{Lifetime, Sliding, Window};

/// Configuration for [`Store::new`].
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// Retention for events. Queries ignore events older than `at - ttl` and
    /// [`Store::evict`] removes events older than `now - ttl`. Zero keeps
    /// everything.
    pub ttl: Duration,

    /// Features computed on every query. Names must be unique and non-empty.
    pub features: Vec<Feature>,

    /// Storage backend. `None` selects [`MemoryStorage::with_retention`]
    /// with `ttl`.
    pub storage: Option<Arc<dyn Storage>>,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("ttl", &self.ttl)
            .field("features", &self.features)
            .field("custom_storage", &self.storage.is_some())
            .finish()
    }
}

/// A validated feature with its defaults resolved.
struct BoundFeature {
    name: String,
    factory: Arc<dyn AggregatorFactory>,
    window: Arc<dyn Window>,
}

/// Embedded point-in-time feature store.
///
/// # Thread Safety
///
/// `Store` is `Send + Sync` and every method takes `&self`; share it with an
/// `Arc`. Concurrency is governed by the storage backend: the built-in
/// [`MemoryStorage`] locks per entity.
pub struct Store {
    storage: Arc<dyn Storage>,
    features: Vec<Feature>,
    bound: Vec<BoundFeature>,
    ttl: Duration,
}

impl Store {
    /// Validates the configuration and creates a store.
    ///
    /// Features without a window get [`Lifetime`].
    ///
    /// # Errors
    ///
    /// Returns [`FeatError::Config`] if there are no features, a name is
    /// empty or repeated, or a feature has no aggregator.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let StoreConfig {
            ttl,
            features,
            storage,
        } = config;

        validate_names(features.iter().map(Feature::name))?;

        let mut resolved = Vec::with_capacity(features.len());
        let mut bound = Vec::with_capacity(features.len());
        for feature in features {
            let Some(factory) = feature.aggregator().cloned() else {
                return Err(ConfigError::MissingAggregator {
                    name: feature.name().to_string(),
                }
                .into());
            };
            let window = feature
                .window()
                .cloned()
                .unwrap_or_else(|| Arc::new(Lifetime) as Arc<dyn Window>);

            bound.push(BoundFeature {
                name: feature.name().to_string(),
                factory,
                window: Arc::clone(&window),
            });
            resolved.push(feature.with_shared_window(window));
        }

        let storage =
            storage.unwrap_or_else(|| Arc::new(MemoryStorage::with_retention(ttl)) as Arc<dyn Storage>);

        tracing::debug!(features = bound.len(), ttl = ?ttl, "store created");
        Ok(Self {
            storage,
            features: resolved,
            bound,
            ttl,
        })
    }

    /// Stores events for an entity.
    ///
    /// Every event must carry a UTC timestamp (offset `+00:00`). The batch is
    /// validated as a whole before anything is stored.
    ///
    /// # Errors
    ///
    /// - [`FeatError::Cancelled`] if `ctx` is already done
    /// - [`FeatError::Event`] naming the first non-UTC event; nothing is stored
    /// - [`FeatError::Storage`] if the backend fails
    pub fn push<I>(&self, ctx: &Context, entity_id: &str, events: I) -> Result<()>
    where
        I: IntoIterator<Item = Event>,
    {
        ctx.check()?;

        let events: Vec<Event> = events.into_iter().collect();
        if let Some((index, event)) = events.iter().enumerate().find(|(_, e)| !e.is_utc()) {
            return Err(EventError::NonUtcTimestamp {
                index,
                offset_seconds: event.timestamp().offset().local_minus_utc(),
            }
            .into());
        }

        let count = events.len();
        self.storage
            .push(ctx, entity_id, events)
            .map_err(|e| storage_failure(StorageOp::Push, e))?;

        tracing::debug!(entity_id, count, "pushed events");
        Ok(())
    }

    /// Computes every feature for an entity as of now.
    ///
    /// # Errors
    ///
    /// Same as [`Store::get_at`].
    pub fn get(&self, ctx: &Context, entity_id: &str) -> Result<FeatureVector> {
        self.get_at(ctx, entity_id, Utc::now())
    }

    /// Computes every feature for an entity as of `at`.
    ///
    /// An unknown entity yields every feature's zero-input value.
    ///
    /// # Errors
    ///
    /// - [`FeatError::Cancelled`] if `ctx` is done on entry or between two
    ///   features
    /// - [`FeatError::Storage`] if the backend read fails
    pub fn get_at(&self, ctx: &Context, entity_id: &str, at: DateTime<Utc>) -> Result<FeatureVector> {
        ctx.check()?;

        let view = self
            .storage
            .get(ctx, entity_id, at)
            .map_err(|e| storage_failure(StorageOp::Get, e))?;

        let mut events = Lifetime.select(&view, at);
        if !self.ttl.is_zero() {
            events = Sliding::new(self.ttl).select(events, at);
        }
        tracing::trace!(entity_id, %at, events = events.len(), "evaluating features");

        let mut result = FeatureVector::with_capacity(self.bound.len());
        for feature in &self.bound {
            ctx.check()?;

            let selected = feature.window.select(events, at);
            let mut aggregator = feature.factory.create();
            for event in selected {
                aggregator.add(event);
            }
            result.insert(feature.name.as_str(), aggregator.result());
        }
        Ok(result)
    }

    /// Computes features for several entities as of now.
    ///
    /// # Errors
    ///
    /// Same as [`Store::batch_get_at`].
    pub fn batch_get<I, S>(&self, ctx: &Context, entity_ids: I) -> Result<HashMap<String, FeatureVector>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.batch_get_at(ctx, entity_ids, Utc::now())
    }

    /// Computes features for several entities as of `at`.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Store::get_at`]; no partial result is
    /// returned.
    pub fn batch_get_at<I, S>(
        &self,
        ctx: &Context,
        entity_ids: I,
        at: DateTime<Utc>,
    ) -> Result<HashMap<String, FeatureVector>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ctx.check()?;

        let entity_ids = entity_ids.into_iter();
        let mut results = HashMap::with_capacity(entity_ids.size_hint().0);
        for entity_id in entity_ids {
            let entity_id = entity_id.as_ref();
            let features = self.get_at(ctx, entity_id, at)?;
            results.insert(entity_id.to_string(), features);
        }
        Ok(results)
    }

    /// Removes events older than `now - ttl` from storage.
    ///
    /// A zero TTL makes this a no-op.
    ///
    /// # Errors
    ///
    /// [`FeatError::Cancelled`] if `ctx` is done (some entities may already
    /// be trimmed), or [`FeatError::Storage`] if the backend fails.
    pub fn evict(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        if self.ttl.is_zero() {
            return Ok(());
        }

        let cutoff = cutoff_before(Utc::now(), self.ttl);
        self.storage
            .evict(ctx, cutoff)
            .map_err(|e| storage_failure(StorageOp::Evict, e))?;

        tracing::debug!(%cutoff, "evicted expired events");
        Ok(())
    }

    /// Entity and event counts from the backend.
    ///
    /// # Errors
    ///
    /// [`FeatError::Cancelled`] or [`FeatError::Storage`].
    pub fn stats(&self, ctx: &Context) -> Result<StorageStats> {
        ctx.check()?;
        self.storage
            .stats(ctx)
            .map_err(|e| storage_failure(StorageOp::Stats, e))
    }

    /// Closes the storage backend.
    ///
    /// # Errors
    ///
    /// [`FeatError::Storage`] if the backend fails to close.
    pub fn close(&self) -> Result<()> {
        self.storage
            .close()
            .map_err(|e| storage_failure(StorageOp::Close, e))
    }

    /// The configured features, with default windows filled in.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// The configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("features", &self.bound.iter().map(|b| &b.name).collect::<Vec<_>>())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn storage_failure(op: StorageOp, source: StorageError) -> FeatError {
    let err = FeatError::storage(op, source);
    if !err.is_cancelled() {
        tracing::warn!(%op, error = %err, "storage call failed");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate;
    use crate::error::CancelError;
    use crate::value::Value;
    use chrono::{FixedOffset, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> DateTime<Utc> {
        base() + chrono::Duration::minutes(m)
    }

    fn config(features: Vec<Feature>) -> StoreConfig {
        StoreConfig {
            ttl: Duration::ZERO,
            features,
            storage: None,
        }
    }

    fn count_store(ttl: Duration) -> Store {
        Store::new(StoreConfig {
            ttl,
            ..config(vec![Feature::new("n", aggregate::count())])
        })
        .unwrap()
    }

    #[test]
    fn test_new_requires_features() {
        let err = Store::new(config(vec![])).unwrap_err();
        assert!(matches!(err, FeatError::Config(ConfigError::NoFeatures)));
    }

    #[test]
    fn test_new_rejects_empty_name() {
        let err = Store::new(config(vec![
            Feature::new("ok", aggregate::count()),
            Feature::new("", aggregate::count()),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            FeatError::Config(ConfigError::EmptyFeatureName { index: 1 })
        ));
    }

    #[test]
    fn test_new_rejects_missing_aggregator() {
        let err = Store::new(config(vec![Feature::named("orphan")])).unwrap_err();
        assert!(matches!(
            err,
            FeatError::Config(ConfigError::MissingAggregator { ref name }) if name == "orphan"
        ));
    }

    #[test]
    fn test_new_rejects_duplicate_names() {
        let err = Store::new(config(vec![
            Feature::new("n", aggregate::count()),
            Feature::new("n", aggregate::sum("amount")),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            FeatError::Config(ConfigError::DuplicateFeatureName { .. })
        ));
    }

    #[test]
    fn test_new_defaults_window_to_lifetime() {
        let store = Store::new(config(vec![Feature::new("n", aggregate::count())])).unwrap();
        assert_eq!(store.features().len(), 1);
        assert!(store.features()[0].window().is_some());
        assert_eq!(store.ttl(), Duration::ZERO);
    }

    #[test]
    fn test_push_rejects_non_utc_batch() {
        let store = count_store(Duration::ZERO);
        let ctx = Context::background();
        let paris = FixedOffset::east_opt(3600).unwrap();

        let events = vec![
            Event::new(base()),
            Event::with_offset(base().with_timezone(&paris), Default::default()),
        ];
        let err = store.push(&ctx, "u", events).unwrap_err();
        assert!(matches!(
            err,
            FeatError::Event(EventError::NonUtcTimestamp {
                index: 1,
                offset_seconds: 3600
            })
        ));

        // Nothing from the batch was stored
        assert_eq!(store.get_at(&ctx, "u", base()).unwrap().int("n"), Ok(0));
    }

    #[test]
    fn test_explicit_zero_offset_is_utc() {
        let store = count_store(Duration::ZERO);
        let ctx = Context::background();
        let zero = FixedOffset::east_opt(0).unwrap();

        let event = Event::with_offset(base().with_timezone(&zero), Default::default());
        store.push(&ctx, "u", [event]).unwrap();
        assert_eq!(store.get_at(&ctx, "u", base()).unwrap().int("n"), Ok(1));
    }

    #[test]
    fn test_get_at_excludes_future_events() {
        let store = count_store(Duration::ZERO);
        let ctx = Context::background();
        store
            .push(&ctx, "u", (0..10).map(|m| Event::new(minutes(m))))
            .unwrap();

        assert_eq!(store.get_at(&ctx, "u", minutes(4)).unwrap().int("n"), Ok(5));
        assert_eq!(store.get_at(&ctx, "u", minutes(-1)).unwrap().int("n"), Ok(0));
    }

    #[test]
    fn test_get_at_ttl_is_relative_to_query_instant() {
        let store = count_store(Duration::from_secs(3600));
        let ctx = Context::background();
        store
            .push(&ctx, "u", [-120, -61, -60, -30, 0].map(|m| Event::new(minutes(m))))
            .unwrap();

        // Boundary event at exactly `at - ttl` is kept
        assert_eq!(store.get_at(&ctx, "u", base()).unwrap().int("n"), Ok(3));
        // A historical query sees what was in retention back then
        assert_eq!(store.get_at(&ctx, "u", minutes(-60)).unwrap().int("n"), Ok(3));
    }

    #[test]
    fn test_unknown_entity_yields_defaults() {
        let store = Store::new(config(vec![
            Feature::new("n", aggregate::count()),
            Feature::new("last_country", aggregate::last("country")),
            Feature::new("age", aggregate::time_since_first()),
        ]))
        .unwrap();

        let features = store.get(&Context::background(), "ghost").unwrap();
        assert_eq!(features.int("n"), Ok(0));
        assert_eq!(features.get("last_country"), Some(&Value::Null));
        assert_eq!(features.duration("age"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_cancelled_context() {
        let store = count_store(Duration::from_secs(60));
        let ctx = Context::background();
        ctx.cancel();

        let err = store.push(&ctx, "u", [Event::new(base())]).unwrap_err();
        assert!(matches!(err, FeatError::Cancelled(CancelError::Cancelled)));
        assert!(store.get_at(&ctx, "u", base()).unwrap_err().is_cancelled());
        assert!(store.batch_get(&ctx, ["u"]).unwrap_err().is_cancelled());
        assert!(store.evict(&ctx).unwrap_err().is_cancelled());
        assert!(store.stats(&ctx).unwrap_err().is_cancelled());

        let live = Context::background();
        assert_eq!(store.stats(&live).unwrap().total_event_count, 0);
    }

    #[test]
    fn test_evict_with_zero_ttl_is_noop() {
        let store = count_store(Duration::ZERO);
        let ctx = Context::background();
        store
            .push(&ctx, "u", [Event::new(base() - chrono::Duration::days(3650))])
            .unwrap();

        store.evict(&ctx).unwrap();
        assert_eq!(store.stats(&ctx).unwrap().total_event_count, 1);
    }

    #[test]
    fn test_close_then_push_fails() {
        let store = count_store(Duration::ZERO);
        let ctx = Context::background();
        store.close().unwrap();

        let err = store.push(&ctx, "u", [Event::new(base())]).unwrap_err();
        assert!(matches!(
            err,
            FeatError::Storage {
                op: StorageOp::Push,
                source: StorageError::Closed
            }
        ));
    }

    #[test]
    fn test_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Store>();
    }
}
