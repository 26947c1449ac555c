//! Streaming aggregators that reduce a window of events to one [`Value`].
//!
//! An [`AggregatorFactory`] produces a fresh [`Aggregator`] for every feature
//! evaluation; instances never share state. Aggregators are total:
//!
//! - `add` never fails: a missing field or a value of the wrong type is
//!   skipped
//! - `result` never fails, including when nothing was added
//!
//! # Built-ins
//!
//! The built-ins are named by [`AggregateSpec`], which is serde-friendly and
//! is itself a factory:
//!
//! | spec              | result on values                   | on no input      |
//! |-------------------|------------------------------------|------------------|
//! | `Count`           | number of events, `Int`            | `Int(0)`         |
//! | `Sum(f)`          | sum of numeric values              | `Float(0.0)`     |
//! | `Min(f)`/`Max(f)` | extreme numeric value              | `Float(0.0)`     |
//! | `Mean(f)`         | arithmetic mean                    | `Float(0.0)`     |
//! | `Last(f)`         | value from the last event with `f` | `Null`           |
//! | `CountDistinct(f)`| distinct values, `Int`             | `Int(0)`         |
//! | `Velocity(w)`     | events per minute                  | `Float(0.0)`     |
//! | `Entropy(f)`      | Shannon entropy, base 2            | `Float(0.0)`     |
//! | `UniqueRatio(f)`  | distinct / events with `f`         | `Float(0.0)`     |
//! | `TimeSinceFirst`  | last instant - first instant       | `Duration(0)`    |
//! | `Percentile(f,p)` | nearest-rank percentile            | `Float(0.0)`     |
//! | `StdDev(f)`       | population standard deviation      | `Float(0.0)`     |
//!
//! Numeric aggregators accept `Int`, `UInt` and `Float` (see
//! [`Value::as_f64`]). Distinct-value aggregators compare by value *and*
//! variant: `Int(42)` and `Float(42.0)` are two different values.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::feature::duration_serde;
use crate::value::Value;

/// Streaming reducer over admitted events.
pub trait Aggregator: Send {
    /// Consumes one admitted event.
    fn add(&mut self, event: &Event);

    /// Returns the aggregate of everything added so far.
    fn result(&self) -> Value;

    /// Returns the aggregator to its freshly created state.
    fn reset(&mut self);
}

/// Creates independent [`Aggregator`] instances.
///
/// Any `Fn() -> Box<dyn Aggregator>` closure is a factory.
pub trait AggregatorFactory: Send + Sync {
    /// Builds a new aggregator with no accumulated state.
    fn create(&self) -> Box<dyn Aggregator>;
}

impl<F> AggregatorFactory for F
where
    F: Fn() -> Box<dyn Aggregator> + Send + Sync,
{
    fn create(&self) -> Box<dyn Aggregator> {
        self()
    }
}

/// Declarative description of a built-in aggregator.
///
/// # Examples
///
/// ```rust
/// use featstore::aggregate::{self, AggregateSpec, AggregatorFactory};
/// use featstore::Value;
///
/// let spec: AggregateSpec = serde_json::from_str(r#"{"kind":"sum","field":"amount"}"#).unwrap();
/// assert_eq!(spec, aggregate::sum("amount"));
///
/// let agg = spec.create();
/// assert_eq!(agg.result(), Value::Float(0.0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateSpec {
    /// Number of events.
    Count,
    /// Sum of a numeric field.
    Sum {
        /// Payload field name.
        field: String,
    },
    /// Minimum of a numeric field.
    Min {
        /// Payload field name.
        field: String,
    },
    /// Maximum of a numeric field.
    Max {
        /// Payload field name.
        field: String,
    },
    /// Mean of a numeric field.
    Mean {
        /// Payload field name.
        field: String,
    },
    /// Most recent value of a field.
    Last {
        /// Payload field name.
        field: String,
    },
    /// Number of distinct values of a field.
    CountDistinct {
        /// Payload field name.
        field: String,
    },
    /// Events per minute.
    Velocity {
        /// Fallback span used when all events share one instant.
        #[serde(with = "duration_serde")]
        window: Duration,
    },
    /// Shannon entropy of a field's values.
    Entropy {
        /// Payload field name.
        field: String,
    },
    /// Distinct values divided by events holding the field.
    UniqueRatio {
        /// Payload field name.
        field: String,
    },
    /// Time between the first and last event.
    TimeSinceFirst,
    /// Nearest-rank percentile of a numeric field.
    Percentile {
        /// Payload field name.
        field: String,
        /// Rank in `[0, 1]`, e.g. `0.95`.
        p: f64,
    },
    /// Population standard deviation of a numeric field.
    StdDev {
        /// Payload field name.
        field: String,
    },
}

impl AggregatorFactory for AggregateSpec {
    fn create(&self) -> Box<dyn Aggregator> {
        match self {
            Self::Count => Box::new(CountAgg::default()),
            Self::Sum { field } => Box::new(SumAgg::new(field)),
            Self::Min { field } => Box::new(ExtremeAgg::new(field, Extreme::Min)),
            Self::Max { field } => Box::new(ExtremeAgg::new(field, Extreme::Max)),
            Self::Mean { field } => Box::new(MeanAgg::new(field)),
            Self::Last { field } => Box::new(LastAgg::new(field)),
            Self::CountDistinct { field } => Box::new(DistinctAgg::new(field, DistinctOutput::Count)),
            Self::Velocity { window } => Box::new(VelocityAgg::new(*window)),
            Self::Entropy { field } => Box::new(EntropyAgg::new(field)),
            Self::UniqueRatio { field } => Box::new(DistinctAgg::new(field, DistinctOutput::Ratio)),
            Self::TimeSinceFirst => Box::new(SpanAgg::default()),
            Self::Percentile { field, p } => Box::new(PercentileAgg::new(field, *p)),
            Self::StdDev { field } => Box::new(StdDevAgg::new(field)),
        }
    }
}

impl fmt::Display for AggregateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Sum { field } => write!(f, "sum({field})"),
            Self::Min { field } => write!(f, "min({field})"),
            Self::Max { field } => write!(f, "max({field})"),
            Self::Mean { field } => write!(f, "mean({field})"),
            Self::Last { field } => write!(f, "last({field})"),
            Self::CountDistinct { field } => write!(f, "count_distinct({field})"),
            Self::Velocity { window } => write!(f, "velocity({window:?})"),
            Self::Entropy { field } => write!(f, "entropy({field})"),
            Self::UniqueRatio { field } => write!(f, "unique_ratio({field})"),
            Self::TimeSinceFirst => write!(f, "time_since_first"),
            Self::Percentile { field, p } => write!(f, "percentile({field}, {p})"),
            Self::StdDev { field } => write!(f, "std_dev({field})"),
        }
    }
}

/// Number of events.
pub fn count() -> AggregateSpec {
    AggregateSpec::Count
}

/// Sum of a numeric field.
pub fn sum(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::Sum { field: field.into() }
}

/// Minimum of a numeric field.
pub fn min(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::Min { field: field.into() }
}

/// Maximum of a numeric field.
pub fn max(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::Max { field: field.into() }
}

/// Mean of a numeric field.
pub fn mean(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::Mean { field: field.into() }
}

/// Most recent value of a field.
pub fn last(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::Last { field: field.into() }
}

/// Number of distinct values of a field.
pub fn count_distinct(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::CountDistinct { field: field.into() }
}

/// Events per minute, falling back to events per `window` when the observed
/// span is zero.
pub fn velocity(window: Duration) -> AggregateSpec {
    AggregateSpec::Velocity { window }
}

/// Shannon entropy (base 2) of a field's values.
pub fn entropy(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::Entropy { field: field.into() }
}

/// Distinct values of a field divided by the events holding it.
pub fn unique_ratio(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::UniqueRatio { field: field.into() }
}

/// Time between the earliest and latest event.
pub fn time_since_first() -> AggregateSpec {
    AggregateSpec::TimeSinceFirst
}

/// Nearest-rank percentile, `p` in `[0, 1]`.
pub fn percentile(field: impl Into<String>, p: f64) -> AggregateSpec {
    AggregateSpec::Percentile {
        field: field.into(),
        p,
    }
}

/// Population standard deviation of a numeric field.
pub fn std_dev(field: impl Into<String>) -> AggregateSpec {
    AggregateSpec::StdDev { field: field.into() }
}

/// Hashable identity of a [`Value`] for distinct counting.
///
/// Floats compare by bit pattern, with `-0.0` folded into `0.0` and every NaN
/// folded into one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(u64),
    String(String),
    Timestamp(DateTime<Utc>),
    Duration(Duration),
}

impl From<&Value> for ValueKey {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(*i),
            Value::UInt(u) => Self::UInt(*u),
            Value::Float(f) => {
                let canonical = if f.is_nan() {
                    f64::NAN
                } else if *f == 0.0 {
                    0.0
                } else {
                    *f
                };
                Self::Float(canonical.to_bits())
            }
            Value::String(s) => Self::String(s.clone()),
            Value::Timestamp(t) => Self::Timestamp(*t),
            Value::Duration(d) => Self::Duration(*d),
        }
    }
}

#[inline]
fn numeric(event: &Event, field: &str) -> Option<f64> {
    event.get(field).and_then(Value::as_f64)
}

#[allow(clippy::cast_precision_loss)] // Spans beyond 2^52 ns are not meaningful here
fn minutes(delta: TimeDelta) -> f64 {
    delta.num_nanoseconds().map_or_else(
        || delta.num_milliseconds() as f64 / 60_000.0,
        |nanos| nanos as f64 / 60_000_000_000.0,
    )
}

#[allow(clippy::cast_possible_wrap)] // Counts never approach i64::MAX
fn count_value(n: usize) -> Value {
    Value::Int(n as i64)
}

#[derive(Debug, Default)]
struct CountAgg {
    n: usize,
}

impl Aggregator for CountAgg {
    fn add(&mut self, _event: &Event) {
        self.n += 1;
    }

    fn result(&self) -> Value {
        count_value(self.n)
    }

    fn reset(&mut self) {
        self.n = 0;
    }
}

#[derive(Debug)]
struct SumAgg {
    field: String,
    sum: f64,
}

impl SumAgg {
    fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            sum: 0.0,
        }
    }
}

impl Aggregator for SumAgg {
    fn add(&mut self, event: &Event) {
        if let Some(v) = numeric(event, &self.field) {
            self.sum += v;
        }
    }

    fn result(&self) -> Value {
        Value::Float(self.sum)
    }

    fn reset(&mut self) {
        self.sum = 0.0;
    }
}

#[derive(Debug, Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

#[derive(Debug)]
struct ExtremeAgg {
    field: String,
    kind: Extreme,
    best: Option<f64>,
}

impl ExtremeAgg {
    fn new(field: &str, kind: Extreme) -> Self {
        Self {
            field: field.to_string(),
            kind,
            best: None,
        }
    }
}

impl Aggregator for ExtremeAgg {
    fn add(&mut self, event: &Event) {
        let Some(v) = numeric(event, &self.field) else {
            return;
        };
        let replace = match (self.best, self.kind) {
            (None, _) => true,
            (Some(best), Extreme::Min) => v < best,
            (Some(best), Extreme::Max) => v > best,
        };
        if replace {
            self.best = Some(v);
        }
    }

    fn result(&self) -> Value {
        Value::Float(self.best.unwrap_or(0.0))
    }

    fn reset(&mut self) {
        self.best = None;
    }
}

#[derive(Debug)]
struct MeanAgg {
    field: String,
    sum: f64,
    n: usize,
}

impl MeanAgg {
    fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            sum: 0.0,
            n: 0,
        }
    }
}

impl Aggregator for MeanAgg {
    fn add(&mut self, event: &Event) {
        if let Some(v) = numeric(event, &self.field) {
            self.sum += v;
            self.n += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn result(&self) -> Value {
        if self.n == 0 {
            return Value::Float(0.0);
        }
        Value::Float(self.sum / self.n as f64)
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.n = 0;
    }
}

#[derive(Debug)]
struct LastAgg {
    field: String,
    last: Value,
}

impl LastAgg {
    fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            last: Value::Null,
        }
    }
}

impl Aggregator for LastAgg {
    fn add(&mut self, event: &Event) {
        if let Some(v) = event.get(&self.field) {
            self.last = v.clone();
        }
    }

    fn result(&self) -> Value {
        self.last.clone()
    }

    fn reset(&mut self) {
        self.last = Value::Null;
    }
}

#[derive(Debug, Clone, Copy)]
enum DistinctOutput {
    Count,
    Ratio,
}

#[derive(Debug)]
struct DistinctAgg {
    field: String,
    output: DistinctOutput,
    seen: HashSet<ValueKey>,
    total: usize,
}

impl DistinctAgg {
    fn new(field: &str, output: DistinctOutput) -> Self {
        Self {
            field: field.to_string(),
            output,
            seen: HashSet::new(),
            total: 0,
        }
    }
}

impl Aggregator for DistinctAgg {
    fn add(&mut self, event: &Event) {
        if let Some(v) = event.get(&self.field) {
            self.seen.insert(ValueKey::from(v));
            self.total += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn result(&self) -> Value {
        match self.output {
            DistinctOutput::Count => count_value(self.seen.len()),
            DistinctOutput::Ratio if self.total == 0 => Value::Float(0.0),
            DistinctOutput::Ratio => Value::Float(self.seen.len() as f64 / self.total as f64),
        }
    }

    fn reset(&mut self) {
        self.seen.clear();
        self.total = 0;
    }
}

/// Earliest and latest admitted instants.
#[derive(Debug, Default, Clone, Copy)]
struct Span {
    bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl Span {
    fn observe(&mut self, instant: DateTime<Utc>) {
        self.bounds = Some(match self.bounds {
            None => (instant, instant),
            Some((first, last)) => (first.min(instant), last.max(instant)),
        });
    }

    fn length(&self) -> TimeDelta {
        self.bounds
            .map_or(TimeDelta::zero(), |(first, last)| last - first)
    }
}

#[derive(Debug)]
struct VelocityAgg {
    window: Duration,
    n: usize,
    span: Span,
}

impl VelocityAgg {
    fn new(window: Duration) -> Self {
        Self {
            window,
            n: 0,
            span: Span::default(),
        }
    }
}

impl Aggregator for VelocityAgg {
    fn add(&mut self, event: &Event) {
        self.n += 1;
        self.span.observe(event.instant());
    }

    #[allow(clippy::cast_precision_loss)]
    fn result(&self) -> Value {
        if self.n == 0 || self.window.is_zero() {
            return Value::Float(0.0);
        }
        let span = self.span.length();
        let per_minutes = if span.is_zero() {
            self.window.as_secs_f64() / 60.0
        } else {
            minutes(span)
        };
        Value::Float(self.n as f64 / per_minutes)
    }

    fn reset(&mut self) {
        self.n = 0;
        self.span = Span::default();
    }
}

#[derive(Debug)]
struct EntropyAgg {
    field: String,
    counts: HashMap<ValueKey, usize>,
    total: usize,
}

impl EntropyAgg {
    fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            counts: HashMap::new(),
            total: 0,
        }
    }
}

impl Aggregator for EntropyAgg {
    fn add(&mut self, event: &Event) {
        if let Some(v) = event.get(&self.field) {
            *self.counts.entry(ValueKey::from(v)).or_insert(0) += 1;
            self.total += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn result(&self) -> Value {
        if self.total == 0 {
            return Value::Float(0.0);
        }
        let total = self.total as f64;
        let entropy = self
            .counts
            .values()
            .map(|&c| {
                let p = c as f64 / total;
                -p * p.log2()
            })
            .sum::<f64>();
        // A single value yields -0.0; report it as 0.0
        Value::Float(entropy + 0.0)
    }

    fn reset(&mut self) {
        self.counts.clear();
        self.total = 0;
    }
}

#[derive(Debug, Default)]
struct SpanAgg {
    span: Span,
}

impl Aggregator for SpanAgg {
    fn add(&mut self, event: &Event) {
        self.span.observe(event.instant());
    }

    fn result(&self) -> Value {
        Value::Duration(self.span.length().to_std().unwrap_or_default())
    }

    fn reset(&mut self) {
        self.span = Span::default();
    }
}

#[derive(Debug)]
struct PercentileAgg {
    field: String,
    p: f64,
    values: Vec<f64>,
}

impl PercentileAgg {
    fn new(field: &str, p: f64) -> Self {
        Self {
            field: field.to_string(),
            p,
            values: Vec::new(),
        }
    }
}

impl Aggregator for PercentileAgg {
    fn add(&mut self, event: &Event) {
        if let Some(v) = numeric(event, &self.field) {
            self.values.push(v);
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )] // Index is floored and clamped to the valid range below
    fn result(&self) -> Value {
        if self.values.is_empty() {
            return Value::Float(0.0);
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);

        let last = sorted.len() - 1;
        let rank = (last as f64 * self.p).floor();
        let index = if rank.is_nan() || rank <= 0.0 {
            0
        } else {
            (rank as usize).min(last)
        };
        Value::Float(sorted[index])
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}

#[derive(Debug)]
struct StdDevAgg {
    field: String,
    values: Vec<f64>,
}

impl StdDevAgg {
    fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            values: Vec::new(),
        }
    }
}

impl Aggregator for StdDevAgg {
    fn add(&mut self, event: &Event) {
        if let Some(v) = numeric(event, &self.field) {
            self.values.push(v);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn result(&self) -> Value {
        if self.values.is_empty() {
            return Value::Float(0.0);
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let variance = self
            .values
            .iter()
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / n;
        Value::Float(variance.sqrt())
    }

    fn reset(&mut self) {
        self.values.clear();
    }
}
