//! # featstore
//!
//! Embedded point-in-time feature store.
//!
//! featstore ingests timestamped events per entity (a user, a card, a
//! device) and answers "what is aggregate X over entity E's history, as of
//! instant T?" in process, with no external infrastructure. It is meant for
//! fraud-detection and ML-serving pipelines that need the same features live
//! at scoring time and historically when building training sets.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - Point-in-time correct: a query at `T` never sees an event after `T`
//! - Per-entity sorted logs with binary-search windows and prefix eviction
//! - Zero-copy reads: queries borrow a shared view of the log
//! - Pluggable storage, windows and aggregators
//! - Lock per entity, so different entities never contend
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use chrono::Utc;
//! use featstore::{aggregate, Context, Event, Feature, Sliding, Store, StoreConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new(StoreConfig {
//!     ttl: Duration::from_secs(30 * 24 * 3600),
//!     features: vec![
//!         Feature::new("txn_count_1h", aggregate::count())
//!             .with_window(Sliding::new(Duration::from_secs(3600))),
//!         Feature::new("distinct_countries", aggregate::count_distinct("country")),
//!     ],
//!     storage: None,
//! })?;
//!
//! let ctx = Context::background();
//! let now = Utc::now();
//! store.push(&ctx, "card_42", [
//!     Event::new(now - chrono::Duration::minutes(5)).with("country", "US"),
//!     Event::new(now).with("country", "BR"),
//! ])?;
//!
//! let features = store.get_at(&ctx, "card_42", now)?;
//! assert_eq!(features.int("txn_count_1h")?, 2);
//! assert_eq!(features.int("distinct_countries")?, 2);
//!
//! // As of three minutes ago only the first event existed
//! let past = store.get_at(&ctx, "card_42", now - chrono::Duration::minutes(3))?;
//! assert_eq!(past.int("txn_count_1h")?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`]: Validates events, owns the features, evaluates queries
//! - [`Storage`]: Backend contract; [`MemoryStorage`] is built in
//! - [`Window`]: Carves a time range out of a sorted log
//! - [`Aggregator`]: Reduces the selected events to one [`Value`]
//! - [`FeatureVector`]: Query result with typed accessors
//!
//! ## Modules
//!
//! - [`store`]: Store orchestration and configuration
//! - [`storage`]: Storage trait and in-memory backend
//! - [`log`]: Per-entity sorted event log and zero-copy views
//! - [`window`]: Sliding and lifetime windows
//! - [`aggregate`]: Aggregator traits and built-ins
//! - [`feature`]: Feature definitions and JSON feature sets
//! - [`result`]: Query results
//! - [`event`]: Events and payloads
//! - [`value`]: Dynamically typed payload values
//! - [`context`]: Cancellation and deadlines
//! - [`error`]: Error types

pub mod aggregate;
pub mod context;
pub mod error;
pub mod event;
pub mod feature;
pub mod log;
pub mod result;
pub mod storage;
pub mod store;
pub mod value;
pub mod window;

// Re-export primary API types at crate root for convenience.
pub use aggregate::{AggregateSpec, Aggregator, AggregatorFactory};
pub use context::Context;
pub use error::{FeatError, Result};
pub use event::{Event, Payload};
pub use feature::{Feature, FeatureConfig, FeatureSetConfig, WindowSpec};
pub use log::EventView;
pub use result::FeatureVector;
pub use storage::{MemoryStorage, Storage, StorageStats};
pub use store::{Store, StoreConfig};
pub use value::Value;
pub use window::{Lifetime, Sliding, Window};
