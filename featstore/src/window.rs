//! Window selection over sorted event slices.
//!
//! A [`Window`] maps `(events sorted ascending, reference instant)` to a
//! sub-slice. Selection is pure: it never allocates and never reorders, it
//! only finds boundaries by binary search.
//!
//! | window          | keeps                             |
//! |-----------------|-----------------------------------|
//! | `Sliding(d)`    | suffix with `instant >= at - d`   |
//! | `Lifetime`      | prefix with `instant <= at`       |
//!
//! `Lifetime` is what makes a historical query point-in-time correct: the
//! log may already hold later events, but they are cut off at `at`.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::storage::cutoff_before;

/// Selects the events relevant to a query instant.
///
/// Implement this for custom windows (business hours, calendar days, …).
/// `events` is always sorted by [`Event::instant`].
pub trait Window: Send + Sync + fmt::Debug {
    /// Returns the selected sub-slice of `events` for reference instant `at`.
    fn select<'a>(&self, events: &'a [Event], at: DateTime<Utc>) -> &'a [Event];
}

/// Events from the last `duration` before the reference instant.
///
/// The lower bound is inclusive. No upper bound is applied; callers that need
/// one (the store does) bound the input first.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use chrono::{TimeZone, Utc};
/// use featstore::{Event, Sliding, Window};
///
/// let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
/// let events: Vec<Event> = [120, 90, 30, 0]
///     .into_iter()
///     .map(|mins| Event::new(at - chrono::Duration::minutes(mins)))
///     .collect();
///
/// let window = Sliding::new(Duration::from_secs(3600));
/// assert_eq!(window.select(&events, at).len(), 2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sliding {
    #[serde(with = "crate::feature::duration_serde")]
    duration: Duration,
}

impl Sliding {
    /// Creates a sliding window of the given length.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The window length.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Window for Sliding {
    #[inline]
    fn select<'a>(&self, events: &'a [Event], at: DateTime<Utc>) -> &'a [Event] {
        let cutoff = cutoff_before(at, self.duration);
        let start = events.partition_point(|e| e.instant() < cutoff);
        &events[start..]
    }
}

/// Every event up to and including the reference instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lifetime;

impl Window for Lifetime {
    #[inline]
    fn select<'a>(&self, events: &'a [Event], at: DateTime<Utc>) -> &'a [Event] {
        let end = events.partition_point(|e| e.instant() <= at);
        &events[..end]
    }
}
