//! Feature definitions and declarative feature-set configuration.
//!
//! A [`Feature`] binds a name to an aggregator factory and a window. Features
//! can be built in code, or described in JSON through [`FeatureSetConfig`]:
//!
//! ```json
//! {
//!   "ttl": 604800.0,
//!   "features": [
//!     { "name": "txn_count_1h",
//!       "aggregate": { "kind": "count" },
//!       "window": { "kind": "sliding", "duration": 3600.0 } },
//!     { "name": "distinct_countries",
//!       "aggregate": { "kind": "count_distinct", "field": "country" } }
//!   ]
//! }
//! ```
//!
//! Durations are fractional seconds. A feature without a window uses
//! [`Lifetime`].

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateSpec, AggregatorFactory};
use crate::error::{ConfigError, Result};
use crate::store::StoreConfig;
use crate::window::{Lifetime, Sliding, Window};

/// A named aggregation over a window.
///
/// The aggregator is optional so that incomplete definitions can be
/// represented and rejected by [`Store::new`](crate::store::Store::new); the
/// window defaults to [`Lifetime`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use featstore::{Feature, Sliding, aggregate};
///
/// let feature = Feature::new("txn_sum_1h", aggregate::sum("amount"))
///     .with_window(Sliding::new(Duration::from_secs(3600)));
/// assert_eq!(feature.name(), "txn_sum_1h");
/// ```
#[derive(Clone)]
pub struct Feature {
    name: String,
    aggregator: Option<Arc<dyn AggregatorFactory>>,
    window: Option<Arc<dyn Window>>,
}

impl Feature {
    /// Creates a feature over the whole history.
    pub fn new(name: impl Into<String>, aggregator: impl AggregatorFactory + 'static) -> Self {
        Self {
            name: name.into(),
            aggregator: Some(Arc::new(aggregator)),
            window: None,
        }
    }

    /// Creates a feature with no aggregator yet.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aggregator: None,
            window: None,
        }
    }

    /// Sets the aggregator factory.
    #[must_use]
    pub fn with_aggregator(mut self, aggregator: impl AggregatorFactory + 'static) -> Self {
        self.aggregator = Some(Arc::new(aggregator));
        self
    }

    /// Sets a shared aggregator factory.
    #[must_use]
    pub fn with_shared_aggregator(mut self, aggregator: Arc<dyn AggregatorFactory>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// Sets the window.
    #[must_use]
    pub fn with_window(mut self, window: impl Window + 'static) -> Self {
        self.window = Some(Arc::new(window));
        self
    }

    /// Sets a shared window.
    #[must_use]
    pub fn with_shared_window(mut self, window: Arc<dyn Window>) -> Self {
        self.window = Some(window);
        self
    }

    /// The feature name, used as the key in results.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The aggregator factory, if set.
    pub fn aggregator(&self) -> Option<&Arc<dyn AggregatorFactory>> {
        self.aggregator.as_ref()
    }

    /// The window, if set.
    pub fn window(&self) -> Option<&Arc<dyn Window>> {
        self.window.as_ref()
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("name", &self.name)
            .field("has_aggregator", &self.aggregator.is_some())
            .field("window", &self.window)
            .finish()
    }
}

/// Serializable window description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowSpec {
    /// Events from the last `duration` before the query instant.
    Sliding {
        /// Window length.
        #[serde(with = "duration_serde")]
        duration: Duration,
    },
    /// Every event up to the query instant.
    Lifetime,
}

impl WindowSpec {
    /// Builds the window this spec describes.
    pub fn build(self) -> Arc<dyn Window> {
        match self {
            Self::Sliding { duration } => Arc::new(Sliding::new(duration)),
            Self::Lifetime => Arc::new(Lifetime),
        }
    }
}

/// Serializable feature description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Feature name.
    pub name: String,

    /// Built-in aggregator to apply.
    pub aggregate: AggregateSpec,

    /// Window to apply; `None` means lifetime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowSpec>,
}

impl FeatureConfig {
    /// Creates a lifetime feature description.
    pub fn new(name: impl Into<String>, aggregate: AggregateSpec) -> Self {
        Self {
            name: name.into(),
            aggregate,
            window: None,
        }
    }

    /// Sets the window.
    #[must_use]
    pub fn with_window(mut self, window: WindowSpec) -> Self {
        self.window = Some(window);
        self
    }

    /// Builds the runtime [`Feature`].
    pub fn into_feature(self) -> Feature {
        let feature = Feature::new(self.name, self.aggregate);
        match self.window {
            Some(window) => feature.with_shared_window(window.build()),
            None => feature,
        }
    }
}

/// A complete, serializable feature set: retention plus feature list.
///
/// # Examples
///
/// ```rust
/// use featstore::feature::FeatureSetConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config: FeatureSetConfig = serde_json::from_str(r#"{
///     "ttl": 3600.0,
///     "features": [{ "name": "n", "aggregate": { "kind": "count" } }]
/// }"#)?;
/// config.validate()?;
/// let store_config = config.into_store_config();
/// assert_eq!(store_config.features.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSetConfig {
    /// Retention for events; zero keeps everything.
    #[serde(with = "duration_serde", default)]
    pub ttl: Duration,

    /// Features computed on every query.
    pub features: Vec<FeatureConfig>,
}

impl FeatureSetConfig {
    /// Reads and validates a feature set from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not a valid feature set, or any
    /// validation error from [`FeatureSetConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
            path: display.clone(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), features = config.features.len(), "loaded feature set");
        Ok(config)
    }

    /// Checks the feature list: at least one feature, names non-empty and
    /// unique.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<()> {
        validate_names(self.features.iter().map(|f| f.name.as_str()))?;
        Ok(())
    }

    /// Converts to a [`StoreConfig`] using the default in-memory storage.
    pub fn into_store_config(self) -> StoreConfig {
        StoreConfig {
            ttl: self.ttl,
            features: self
                .features
                .into_iter()
                .map(FeatureConfig::into_feature)
                .collect(),
            storage: None,
        }
    }
}

/// Rejects an empty list, empty names and repeated names.
pub(crate) fn validate_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> std::result::Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, name) in names.into_iter().enumerate() {
        if name.is_empty() {
            return Err(ConfigError::EmptyFeatureName { index });
        }
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateFeatureName {
                name: name.to_string(),
            });
        }
    }
    if seen.is_empty() {
        return Err(ConfigError::NoFeatures);
    }
    Ok(())
}

/// Serde adapter storing a `Duration` as fractional seconds.
pub(crate) mod duration_serde {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds)
            .map_err(|e| D::Error::custom(format!("invalid duration {seconds}s: {e}")))
    }
}
