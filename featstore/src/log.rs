//! Per-entity sorted event log.
//!
//! An [`EntityLog`] owns the events of one entity, kept in non-decreasing
//! instant order at all times. It is the storage primitive behind
//! [`MemoryStorage`](crate::storage::MemoryStorage).
//!
//! # Design
//!
//! - Events live in an `Arc<Vec<Event>>` guarded by a per-entity `RwLock`
//! - Reads hand out an [`EventView`]: a clone of the `Arc` plus an index
//!   range, so no event is copied and no lock is held after the read
//! - Writes go through `Arc::make_mut`: while a view is outstanding the
//!   writer gets a private copy, so a view never changes under its holder
//! - Eviction is a prefix trim that only moves a head index; the dead prefix
//!   is dropped once it makes up half of the buffer
//!
//! # Insertion
//!
//! A single event is placed by binary search after every event with the
//! same or an earlier instant (O(log n) search, O(n) shift). A batch is
//! appended and the live range stably sorted once (O(n log n)), which beats
//! m separate insertions once m is more than a handful.
//!
//! Both paths place a new event after existing events with an equal instant,
//! and a batch keeps its own relative order.

use std::ops::{Deref, Range};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::event::Event;

/// Minimum dead prefix length before an eviction compacts the buffer.
const COMPACT_MIN_HEAD: usize = 64;

/// Read-only, zero-copy view of a contiguous run of sorted events.
///
/// A view shares the buffer it was taken from. It can only be read: the
/// type exposes `&[Event]` and nothing else, and the log never mutates a
/// buffer while a view of it exists. Use [`EventView::to_vec`] to obtain a
/// caller-owned copy.
#[derive(Debug, Clone)]
pub struct EventView {
    events: Arc<Vec<Event>>,
    range: Range<usize>,
}

impl EventView {
    /// An empty view.
    pub fn empty() -> Self {
        Self {
            events: Arc::new(Vec::new()),
            range: 0..0,
        }
    }

    /// Wraps a shared buffer and a range within it.
    ///
    /// The range is clamped to the buffer length. The events in range must
    /// already be sorted by instant.
    pub fn new(events: Arc<Vec<Event>>, range: Range<usize>) -> Self {
        let end = range.end.min(events.len());
        let start = range.start.min(end);
        Self {
            events,
            range: start..end,
        }
    }

    /// Builds a view over an owned buffer, sorting it by instant first.
    ///
    /// Intended for custom storage backends that materialise rows.
    pub fn from_unsorted(mut events: Vec<Event>) -> Self {
        events.sort_by_key(Event::instant);
        let len = events.len();
        Self::new(Arc::new(events), 0..len)
    }

    /// The viewed events.
    #[inline]
    pub fn as_slice(&self) -> &[Event] {
        &self.events[self.range.clone()]
    }

    /// Copies the viewed events into a caller-owned vector.
    pub fn to_vec(&self) -> Vec<Event> {
        self.as_slice().to_vec()
    }
}

impl Default for EventView {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for EventView {
    type Target = [Event];

    fn deref(&self) -> &[Event] {
        self.as_slice()
    }
}

impl AsRef<[Event]> for EventView {
    fn as_ref(&self) -> &[Event] {
        self.as_slice()
    }
}

/// Buffer state guarded by the entity lock.
#[derive(Debug, Default)]
struct LogState {
    /// Events, sorted by instant from `head` onwards.
    events: Arc<Vec<Event>>,
    /// Index of the first live event; everything before it was evicted.
    head: usize,
}

impl LogState {
    fn live(&self) -> &[Event] {
        &self.events[self.head..]
    }

    fn live_len(&self) -> usize {
        self.events.len() - self.head
    }
}

/// Sorted event log for one entity.
///
/// # Thread Safety
///
/// Readers share the lock; a writer holds it exclusively. Logs for
/// different entities have independent locks.
#[derive(Debug, Default)]
pub struct EntityLog {
    state: RwLock<LogState>,
}

impl EntityLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts events, keeping the log sorted.
    ///
    /// The whole batch becomes visible to readers at once.
    pub fn insert(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }

        let mut state = self.state.write();
        let head = state.head;

        if events.len() == 1 {
            let live = state.live();
            let event_instant = events[0].instant();
            let offset = live.partition_point(|e| e.instant() <= event_instant);
            let buffer = Arc::make_mut(&mut state.events);
            buffer.extend(events);
            // Move the appended event from the tail into position.
            buffer[head + offset..].rotate_right(1);
        } else {
            let buffer = Arc::make_mut(&mut state.events);
            buffer.extend(events);
            buffer[head..].sort_by_key(Event::instant);
        }
    }

    /// Returns the live events with `lower <= instant <= upper`.
    ///
    /// `lower = None` leaves the range unbounded below.
    pub fn view(&self, lower: Option<DateTime<Utc>>, upper: DateTime<Utc>) -> EventView {
        let state = self.state.read();
        let live = state.live();

        let start = lower.map_or(0, |lower| live.partition_point(|e| e.instant() < lower));
        let end = live.partition_point(|e| e.instant() <= upper).max(start);

        EventView::new(
            Arc::clone(&state.events),
            state.head + start..state.head + end,
        )
    }

    /// Removes every event with `instant < cutoff` and returns how many.
    pub fn evict_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut state = self.state.write();
        let removed = state.live().partition_point(|e| e.instant() < cutoff);
        if removed == 0 {
            return 0;
        }

        state.head += removed;

        let head = state.head;
        if head == state.events.len() {
            state.events = Arc::new(Vec::new());
            state.head = 0;
        } else if head >= COMPACT_MIN_HEAD && head * 2 >= state.events.len() {
            Arc::make_mut(&mut state.events).drain(..head);
            state.head = 0;
        }

        removed
    }

    /// Number of live events.
    pub fn len(&self) -> usize {
        self.state.read().live_len()
    }

    /// Returns `true` if the log holds no live events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every event.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.events = Arc::new(Vec::new());
        state.head = 0;
    }
}
