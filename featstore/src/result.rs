//! Query results.

use std::collections::HashMap;
use std::collections::hash_map;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ResultError;
use crate::value::Value;

/// Feature values computed for one entity at one instant, keyed by feature
/// name.
///
/// Typed accessors are strict: [`FeatureVector::int`] only accepts an `Int`,
/// [`FeatureVector::float`] only a `Float`. Use [`FeatureVector::get`] and
/// [`Value::as_f64`] for coercion.
///
/// # Examples
///
/// ```rust
/// use featstore::{FeatureVector, Value};
///
/// let features = FeatureVector::from_iter([
///     ("txn_count".to_string(), Value::Int(3)),
///     ("txn_sum".to_string(), Value::Float(250.0)),
/// ]);
///
/// assert_eq!(features.int("txn_count"), Ok(3));
/// assert!(features.int("txn_sum").is_err());
/// assert_eq!(features.float_or("missing", -1.0), -1.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: HashMap<String, Value>,
}

impl FeatureVector {
    /// Creates an empty vector.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// The raw value of a feature.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns `true` if the feature was computed.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Integer value of a feature.
    ///
    /// # Errors
    ///
    /// [`ResultError::NotFound`] if absent, [`ResultError::TypeMismatch`] if
    /// not an `Int`.
    pub fn int(&self, name: &str) -> Result<i64, ResultError> {
        self.typed(name, "int", |v| match *v {
            Value::Int(i) => Some(i),
            _ => None,
        })
    }

    /// Integer value of a feature, or `default`.
    pub fn int_or(&self, name: &str, default: i64) -> i64 {
        self.int(name).unwrap_or(default)
    }

    /// Float value of a feature.
    ///
    /// # Errors
    ///
    /// [`ResultError::NotFound`] if absent, [`ResultError::TypeMismatch`] if
    /// not a `Float`.
    pub fn float(&self, name: &str) -> Result<f64, ResultError> {
        self.typed(name, "float", |v| match *v {
            Value::Float(f) => Some(f),
            _ => None,
        })
    }

    /// Float value of a feature, or `default`.
    pub fn float_or(&self, name: &str, default: f64) -> f64 {
        self.float(name).unwrap_or(default)
    }

    /// String value of a feature.
    ///
    /// # Errors
    ///
    /// [`ResultError::NotFound`] if absent, [`ResultError::TypeMismatch`] if
    /// not a `String`.
    pub fn string(&self, name: &str) -> Result<&str, ResultError> {
        let value = self.lookup(name)?;
        value.as_str().ok_or_else(|| mismatch(name, "string", value))
    }

    /// String value of a feature, or `default`.
    pub fn string_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.string(name).unwrap_or(default)
    }

    /// Boolean value of a feature.
    ///
    /// # Errors
    ///
    /// [`ResultError::NotFound`] if absent, [`ResultError::TypeMismatch`] if
    /// not a `Bool`.
    pub fn bool(&self, name: &str) -> Result<bool, ResultError> {
        self.typed(name, "bool", Value::as_bool)
    }

    /// Duration value of a feature.
    ///
    /// # Errors
    ///
    /// [`ResultError::NotFound`] if absent, [`ResultError::TypeMismatch`] if
    /// not a `Duration`.
    pub fn duration(&self, name: &str) -> Result<Duration, ResultError> {
        self.typed(name, "duration", Value::as_duration)
    }

    /// Duration value of a feature, or `default`.
    pub fn duration_or(&self, name: &str, default: Duration) -> Duration {
        self.duration(name).unwrap_or(default)
    }

    /// Timestamp value of a feature.
    ///
    /// # Errors
    ///
    /// [`ResultError::NotFound`] if absent, [`ResultError::TypeMismatch`] if
    /// not a `Timestamp`.
    pub fn timestamp(&self, name: &str) -> Result<DateTime<Utc>, ResultError> {
        self.typed(name, "timestamp", Value::as_timestamp)
    }

    /// Every computed value.
    pub fn all(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Iterates over `(name, value)` pairs in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no feature was computed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Plain JSON object of the values, see [`Value::to_json`].
    pub fn to_json(&self) -> serde_json::Value {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }

    fn lookup(&self, name: &str) -> Result<&Value, ResultError> {
        self.values.get(name).ok_or_else(|| ResultError::NotFound {
            name: name.to_string(),
        })
    }

    fn typed<T>(
        &self,
        name: &str,
        expected: &'static str,
        extract: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<T, ResultError> {
        let value = self.lookup(name)?;
        extract(value).ok_or_else(|| mismatch(name, expected, value))
    }
}

fn mismatch(name: &str, expected: &'static str, actual: &Value) -> ResultError {
    ResultError::TypeMismatch {
        name: name.to_string(),
        expected,
        actual: actual.kind(),
    }
}

impl FromIterator<(String, Value)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for FeatureVector {
    type Item = (String, Value);
    type IntoIter = hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a> IntoIterator for &'a FeatureVector {
    type Item = (&'a String, &'a Value);
    type IntoIter = hash_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FeatureVector {
        let mut features = FeatureVector::with_capacity(4);
        features.insert("count", Value::Int(5));
        features.insert("sum", Value::Float(99.5));
        features.insert("country", Value::from("US"));
        features.insert("age", Value::Duration(Duration::from_secs(90)));
        features
    }

    #[test]
    fn test_typed_accessors() {
        let features = sample();
        assert_eq!(features.int("count"), Ok(5));
        assert_eq!(features.float("sum"), Ok(99.5));
        assert_eq!(features.string("country"), Ok("US"));
        assert_eq!(features.duration("age"), Ok(Duration::from_secs(90)));
        assert_eq!(features.len(), 4);
    }

    #[test]
    fn test_not_found() {
        let features = sample();
        assert_eq!(
            features.int("missing"),
            Err(ResultError::NotFound {
                name: "missing".to_string()
            })
        );
        assert!(!features.contains("missing"));
    }

    #[test]
    fn test_type_mismatch_is_strict() {
        let features = sample();
        assert_eq!(
            features.int("sum"),
            Err(ResultError::TypeMismatch {
                name: "sum".to_string(),
                expected: "int",
                actual: "float",
            })
        );
        // No silent int-to-float widening
        assert!(features.float("count").is_err());
        assert!(features.bool("country").is_err());
        assert!(features.timestamp("age").is_err());
    }

    #[test]
    fn test_defaults() {
        let features = sample();
        assert_eq!(features.int_or("sum", -1), -1);
        assert_eq!(features.int_or("count", -1), 5);
        assert_eq!(features.float_or("missing", 0.5), 0.5);
        assert_eq!(features.string_or("count", "n/a"), "n/a");
        assert_eq!(
            features.duration_or("missing", Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_to_json() {
        let json = sample().to_json();
        assert_eq!(json["count"], 5);
        assert_eq!(json["sum"], 99.5);
        assert_eq!(json["country"], "US");
        assert_eq!(json["age"], 90.0);
    }

    #[test]
    fn test_iteration() {
        let features = sample();
        let mut names: Vec<&String> = features.iter().map(|(name, _)| name).collect();
        names.sort();
        assert_eq!(names, vec!["age", "count", "country", "sum"]);
        assert_eq!((&features).into_iter().count(), 4);
        assert!(FeatureVector::new().is_empty());
    }
}
