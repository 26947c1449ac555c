//! Dynamically typed payload values.
//!
//! Event payloads are heterogeneous: one event may carry an `amount` as an
//! integer, the next as a float, a third may omit it. [`Value`] makes the set
//! of accepted shapes explicit so every aggregator's acceptance rule can be
//! read off a `match`.
//!
//! # Numeric coercion
//!
//! | variant     | [`Value::as_f64`] |
//! |-------------|-------------------|
//! | `Int`       | `Some(i as f64)`  |
//! | `UInt`      | `Some(u as f64)`  |
//! | `Float`     | `Some(f)`         |
//! | anything else | `None`          |
//!
//! Coercion never fails loudly; aggregators simply skip `None`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single payload field value or feature result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Absent or explicit null.
    #[default]
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer too large for `Int`, or declared unsigned.
    UInt(u64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Elapsed time.
    Duration(Duration),
}

impl Value {
    /// Coerces numeric variants to `f64`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use featstore::Value;
    ///
    /// assert_eq!(Value::Int(3).as_f64(), Some(3.0));
    /// assert_eq!(Value::Float(2.5).as_f64(), Some(2.5));
    /// assert_eq!(Value::from("3").as_f64(), None);
    /// ```
    #[allow(clippy::cast_precision_loss)] // Matches the integer-to-float coercion table
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Int(i) => Some(i as f64),
            Self::UInt(u) => Some(u as f64),
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int`, or a `UInt` that fits `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Int(i) => Some(i),
            Self::UInt(u) => i64::try_from(u).ok(),
            _ => None,
        }
    }

    /// Returns the string slice if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the flag if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the duration if this is a `Duration`.
    pub fn as_duration(&self) -> Option<Duration> {
        match *self {
            Self::Duration(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the instant if this is a `Timestamp`.
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match *self {
            Self::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Duration(_) => "duration",
        }
    }

    /// Converts to plain JSON, the way results are exported.
    ///
    /// Timestamps become RFC 3339 strings and durations fractional seconds.
    /// Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => (*b).into(),
            Self::Int(i) => (*i).into(),
            Self::UInt(u) => (*u).into(),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => s.clone().into(),
            Self::Timestamp(t) => t.to_rfc3339().into(),
            Self::Duration(d) => serde_json::Number::from_f64(d.as_secs_f64())
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
        }
    }
}

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Self::UInt(u64::from(v))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32, u64);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Self::Duration(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// JSON numbers map to `Int` when they fit `i64`, then `UInt`, then `Float`.
/// Arrays and objects are kept as their compact JSON text.
impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    n.as_f64().map_or(Self::Null, Self::Float)
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::String(other.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_coercion_table() {
        assert_eq!(Value::from(7i32).as_f64(), Some(7.0));
        assert_eq!(Value::from(7u16).as_f64(), Some(7.0));
        assert_eq!(Value::from(1.5f32).as_f64(), Some(1.5));
        assert_eq!(Value::from(-2.25).as_f64(), Some(-2.25));

        assert_eq!(Value::Null.as_f64(), None);
        assert_eq!(Value::from(true).as_f64(), None);
        assert_eq!(Value::from("100").as_f64(), None);
        assert_eq!(Value::from(Duration::from_secs(1)).as_f64(), None);
    }

    #[test]
    fn test_int_and_float_are_distinct_variants() {
        assert_ne!(Value::Int(42), Value::Float(42.0));
        assert_eq!(Value::Int(42).as_f64(), Value::Float(42.0).as_f64());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from(json!(null)), Value::Null);
        assert_eq!(Value::from(json!(12)), Value::Int(12));
        assert_eq!(Value::from(json!(u64::MAX)), Value::UInt(u64::MAX));
        assert_eq!(Value::from(json!(12.5)), Value::Float(12.5));
        assert_eq!(Value::from(json!("US")), Value::from("US"));
        assert_eq!(Value::from(json!([1, 2])), Value::from("[1,2]"));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(Value::Int(3).to_json(), json!(3));
        assert_eq!(Value::Float(f64::NAN).to_json(), json!(null));
        assert_eq!(
            Value::Duration(Duration::from_millis(1500)).to_json(),
            json!(1.5)
        );
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Value::Int(1).kind(), "int");
        assert_eq!(Value::Float(1.0).kind(), "float");
        assert_eq!(Value::Null.kind(), "null");
    }
}
