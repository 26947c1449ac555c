//! Storage backends for per-entity event logs.
//!
//! [`Storage`] is the contract the [`Store`](crate::store::Store) consumes.
//! [`MemoryStorage`] is the built-in backend: a concurrent entity directory
//! mapping entity ids to [`EntityLog`]s.
//!
//! # Retention
//!
//! A backend may or may not know a retention duration:
//!
//! - [`MemoryStorage::new`] is retention-agnostic: `get` returns everything
//!   up to the query instant and TTL filtering is left to the caller
//! - [`MemoryStorage::with_retention`] also bounds reads by
//!   `at - retention`, measured from the query instant so historical reads
//!   stay point-in-time correct, and can evict relative to the wall clock
//!   via [`MemoryStorage::evict_expired`]
//!
//! # Contract for implementors
//!
//! - `push` keeps each entity's events sorted by instant and makes a batch
//!   visible all at once
//! - `get` never returns an event with `instant > at`; an unknown entity
//!   yields an empty view
//! - `evict(cutoff)` removes exactly the events with `instant < cutoff`
//! - every method checks the [`Context`] before doing work

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

use crate::context::{CANCEL_CHECK_INTERVAL, Context};
use crate::error::StorageError;
use crate::event::Event;
use crate::log::{EntityLog, EventView};

/// Result type for storage backends.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage statistics.
///
/// Collected entity by entity without a global lock; with concurrent writers
/// the totals may mix states from slightly different moments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// Number of entities that have a log.
    pub entity_count: usize,
    /// Number of retained events across all entities.
    pub total_event_count: u64,
}

/// Event storage backend.
///
/// Implementations must be safe to call concurrently from many threads.
pub trait Storage: Send + Sync {
    /// Adds events for an entity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the context is cancelled or the backend
    /// fails. A failed push must leave nothing visible.
    fn push(&self, ctx: &Context, entity_id: &str, events: Vec<Event>) -> StorageResult<()>;

    /// Returns the entity's events with `instant <= at`, further bounded by
    /// the backend's own retention policy if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the context is cancelled or the backend
    /// fails.
    fn get(&self, ctx: &Context, entity_id: &str, at: DateTime<Utc>) -> StorageResult<EventView>;

    /// Removes every event with `instant < cutoff`, across all entities.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the context is cancelled (possibly after
    /// some entities were already trimmed) or the backend fails.
    fn evict(&self, ctx: &Context, cutoff: DateTime<Utc>) -> StorageResult<()>;

    /// Returns entity and event counts.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the context is cancelled or the backend
    /// fails.
    fn stats(&self, ctx: &Context) -> StorageResult<StorageStats>;

    /// Releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to shut down cleanly.
    fn close(&self) -> StorageResult<()>;
}

/// In-memory storage: a concurrent map from entity id to [`EntityLog`].
///
/// # Thread Safety
///
/// Each entity has its own lock, so calls for different entities never
/// block each other. The first push for an entity creates its log with an
/// atomic get-or-insert; concurrent first pushes all land in the same log.
///
/// # Examples
///
/// ```rust
/// use chrono::Utc;
/// use featstore::{Context, Event, MemoryStorage, Storage};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = MemoryStorage::new();
/// let ctx = Context::background();
/// let now = Utc::now();
///
/// storage.push(&ctx, "user_1", vec![Event::new(now).with("amount", 10)])?;
/// let events = storage.get(&ctx, "user_1", now)?;
/// assert_eq!(events.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entities: DashMap<String, Arc<EntityLog>>,
    retention: Option<Duration>,
    /// Held shared by writers and exclusively by `close`.
    closed: RwLock<bool>,
}

impl MemoryStorage {
    /// Creates a retention-agnostic store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that bounds reads by `retention`.
    ///
    /// A zero retention means "keep everything", same as [`MemoryStorage::new`].
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            retention: (!retention.is_zero()).then_some(retention),
            ..Self::default()
        }
    }

    /// The configured retention, if any.
    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }

    /// Evicts everything older than `now - retention`.
    ///
    /// Without a retention this is a no-op.
    ///
    /// # Errors
    ///
    /// Same as [`Storage::evict`].
    pub fn evict_expired(&self, ctx: &Context) -> StorageResult<()> {
        let Some(retention) = self.retention else {
            return Ok(());
        };
        let cutoff = cutoff_before(Utc::now(), retention);
        self.evict(ctx, cutoff)
    }

    /// Number of events held for one entity.
    pub fn entity_len(&self, entity_id: &str) -> usize {
        self.entities.get(entity_id).map_or(0, |log| log.len())
    }

    /// Keeps the storage open for as long as the guard lives.
    fn open_guard(&self) -> StorageResult<RwLockReadGuard<'_, bool>> {
        let closed = self.closed.read();
        if *closed {
            return Err(StorageError::Closed);
        }
        Ok(closed)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        self.open_guard().map(drop)
    }

    /// Returns the entity's log, creating it on first use.
    fn log_for(&self, entity_id: &str) -> Arc<EntityLog> {
        if let Some(log) = self.entities.get(entity_id) {
            return Arc::clone(log.value());
        }
        // The shard lock is released before the entity lock is taken.
        Arc::clone(self.entities.entry(entity_id.to_string()).or_default().value())
    }

    /// Snapshot of the logs so that no shard lock is held while scanning.
    fn logs(&self) -> Vec<Arc<EntityLog>> {
        self.entities
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Visits every log, re-checking `ctx` every [`CANCEL_CHECK_INTERVAL`]
    /// entities.
    fn scan<F>(&self, ctx: &Context, mut visit: F) -> StorageResult<()>
    where
        F: FnMut(&EntityLog),
    {
        for (visited, log) in self.logs().into_iter().enumerate() {
            if visited > 0 && visited % CANCEL_CHECK_INTERVAL == 0 {
                ctx.check()?;
            }
            visit(&log);
        }
        Ok(())
    }
}

impl Storage for MemoryStorage {
    fn push(&self, ctx: &Context, entity_id: &str, events: Vec<Event>) -> StorageResult<()> {
        ctx.check()?;
        let _open = self.open_guard()?;

        let count = events.len();
        self.log_for(entity_id).insert(events);
        tracing::trace!(entity_id, count, "events stored");
        Ok(())
    }

    fn get(&self, ctx: &Context, entity_id: &str, at: DateTime<Utc>) -> StorageResult<EventView> {
        ctx.check()?;
        self.ensure_open()?;

        let Some(log) = self.entities.get(entity_id).map(|log| Arc::clone(log.value())) else {
            return Ok(EventView::empty());
        };
        let lower = self.retention.map(|retention| cutoff_before(at, retention));
        Ok(log.view(lower, at))
    }

    fn evict(&self, ctx: &Context, cutoff: DateTime<Utc>) -> StorageResult<()> {
        ctx.check()?;
        self.ensure_open()?;

        let mut removed = 0usize;
        self.scan(ctx, |log| removed += log.evict_before(cutoff))?;

        tracing::debug!(%cutoff, removed, "evicted events");
        Ok(())
    }

    fn stats(&self, ctx: &Context) -> StorageResult<StorageStats> {
        ctx.check()?;
        self.ensure_open()?;

        let mut stats = StorageStats::default();
        self.scan(ctx, |log| {
            stats.entity_count += 1;
            stats.total_event_count += log.len() as u64;
        })?;
        Ok(stats)
    }

    fn close(&self) -> StorageResult<()> {
        let mut closed = self.closed.write();
        if *closed {
            return Ok(());
        }
        *closed = true;
        self.entities.clear();
        tracing::debug!("memory storage closed");
        Ok(())
    }
}

/// `at - retention`, saturating at the earliest representable instant.
pub(crate) fn cutoff_before(at: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| at.checked_sub_signed(retention))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
