//! Timestamped events.
//!
//! An [`Event`] is immutable once built: the timestamp and payload are only
//! reachable through accessors. Events keep the offset they were created
//! with so that the store can reject anything that is not UTC-normalized;
//! ordering always uses the UTC instant.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Field name to value mapping carried by an event.
pub type Payload = BTreeMap<String, Value>;

/// One timestamped record attributed to an entity.
///
/// # Examples
///
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use featstore::Event;
///
/// let ts = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
/// let event = Event::new(ts)
///     .with("amount", 100.0)
///     .with("country", "US");
///
/// assert_eq!(event.instant(), ts);
/// assert_eq!(event.get("amount").and_then(|v| v.as_f64()), Some(100.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    payload: Payload,
}

impl Event {
    /// Creates an event at a UTC instant with an empty payload.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: timestamp.fixed_offset(),
            payload: Payload::new(),
        }
    }

    /// Creates an event from an arbitrary offset timestamp and payload.
    ///
    /// The event is accepted by the store only if the offset is zero.
    pub fn with_offset(timestamp: DateTime<FixedOffset>, payload: Payload) -> Self {
        Self { timestamp, payload }
    }

    /// Creates a UTC event with the given payload.
    pub fn with_payload(timestamp: DateTime<Utc>, payload: Payload) -> Self {
        Self {
            timestamp: timestamp.fixed_offset(),
            payload,
        }
    }

    /// Builder-style helper adding one payload field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(field.into(), value.into());
        self
    }

    /// The timestamp as it was supplied, offset included.
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// The UTC instant used for ordering and window selection.
    #[inline]
    pub fn instant(&self) -> DateTime<Utc> {
        self.timestamp.with_timezone(&Utc)
    }

    /// Returns `true` if the timestamp offset is exactly `+00:00`.
    pub fn is_utc(&self) -> bool {
        self.timestamp.offset().local_minus_utc() == 0
    }

    /// The full payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Looks up one payload field.
    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.payload.get(field)
    }
}
