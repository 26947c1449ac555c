//! Error types for the featstore feature store.

use std::fmt;

use thiserror::Error;

/// Boxed error type used by storage backends to carry their native errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for all featstore operations.
///
/// Configuration and event validation failures are reported before anything
/// is changed. Storage failures carry the store operation that triggered
/// them. Cancellation is reported as soon as it is observed, whether the
/// store or the storage backend noticed it first.
#[derive(Error, Debug)]
pub enum FeatError {
    /// The store configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An event handed to `push` failed validation.
    #[error("invalid event: {0}")]
    Event(#[from] EventError),

    /// The storage backend failed.
    #[error("failed to {op}: {source}")]
    Storage {
        /// The store operation that issued the storage call.
        op: StorageOp,
        /// The underlying storage error.
        #[source]
        source: StorageError,
    },

    /// The operation was cancelled or ran past its deadline.
    #[error("operation aborted: {0}")]
    Cancelled(#[from] CancelError),
}

impl FeatError {
    /// Wraps a storage error with the operation that produced it.
    ///
    /// Cancellation observed inside the backend is lifted to
    /// [`FeatError::Cancelled`] so callers see one cancellation shape.
    pub fn storage(op: StorageOp, source: StorageError) -> Self {
        match source {
            StorageError::Cancelled(cancel) => Self::Cancelled(cancel),
            source => Self::Storage { op, source },
        }
    }

    /// Returns `true` if this error is a cancellation or deadline expiry.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Store operations that call into the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    /// `Store::push`.
    Push,
    /// `Store::get_at` and friends.
    Get,
    /// `Store::evict`.
    Evict,
    /// `Store::stats`.
    Stats,
    /// `Store::close`.
    Close,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Self::Push => "push events",
            Self::Get => "fetch events",
            Self::Evict => "evict events",
            Self::Stats => "collect stats",
            Self::Close => "close storage",
        };
        f.write_str(verb)
    }
}

/// Errors raised while validating store or feature configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No features were configured.
    #[error("at least one feature is required")]
    NoFeatures,

    /// A feature has an empty name.
    #[error("feature {index} has an empty name")]
    EmptyFeatureName {
        /// Position of the feature in the configured list.
        index: usize,
    },

    /// Two features share a name.
    #[error("feature name '{name}' is used more than once")]
    DuplicateFeatureName {
        /// The repeated name.
        name: String,
    },

    /// A feature has no aggregator factory.
    #[error("feature '{name}' has no aggregator")]
    MissingAggregator {
        /// The feature name.
        name: String,
    },

    /// A feature set file could not be read.
    #[error("failed to read feature set '{path}': {source}")]
    Load {
        /// The file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A feature set file is not valid JSON for the expected shape.
    #[error("failed to parse feature set '{path}': {source}")]
    Parse {
        /// The file path.
        path: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised while validating events on the write path.
#[derive(Error, Debug)]
pub enum EventError {
    /// The event timestamp carries a non-zero UTC offset.
    #[error("event {index}: timestamp must be UTC, found offset {offset_seconds}s")]
    NonUtcTimestamp {
        /// Position of the offending event in the pushed batch.
        index: usize,
        /// The offset east of UTC, in seconds.
        offset_seconds: i32,
    },
}

/// Errors reported by a [`Storage`](crate::storage::Storage) backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend has been closed.
    #[error("storage is closed")]
    Closed,

    /// The backend failed to complete the call.
    #[error("backend failure: {reason}")]
    Backend {
        /// Description of the failure.
        reason: String,
        /// The backend's native error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// The call observed a cancelled context.
    #[error(transparent)]
    Cancelled(#[from] CancelError),
}

impl StorageError {
    /// Builds a [`StorageError::Backend`] without an underlying cause.
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
            source: None,
        }
    }

    /// Builds a [`StorageError::Backend`] wrapping a native backend error.
    pub fn backend_with<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Backend {
            reason: reason.into(),
            source: Some(source.into()),
        }
    }
}

/// Why a [`Context`](crate::context::Context) stopped an operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelError {
    /// The cancellation token was triggered.
    #[error("operation cancelled")]
    Cancelled,

    /// The deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by the typed accessors of a
/// [`FeatureVector`](crate::result::FeatureVector).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    /// No feature with this name was computed.
    #[error("feature '{name}' not found")]
    NotFound {
        /// The requested feature name.
        name: String,
    },

    /// The feature exists but holds another kind of value.
    #[error("feature '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        /// The requested feature name.
        name: String,
        /// The kind the accessor expects.
        expected: &'static str,
        /// The kind actually stored.
        actual: &'static str,
    },
}

/// Type alias for `Result<T, FeatError>`.
pub type Result<T> = std::result::Result<T, FeatError>;
