//! Core library for the `forecast` CLI.
//!
//! This crate defines:
//! - Shared observation models and the consensus forecast
//! - The aggregation engine and its per-source weight table
//! - Provider adapters behind a common `ForecastSource` trait
//! - A time-boxed source cache
//! - Configuration & credentials handling
//!
//! It is used by `forecast-cli`, but can also be reused by other front-ends.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod weights;

pub use aggregator::{AggregationReport, Aggregator};
pub use cache::{CachedSource, SourceCache};
pub use config::{Config, FetchConfig, ProviderConfig};
pub use error::{SourceError, SourceFailure};
pub use model::{DailyObservation, HourlyObservation, ObservedAt, SourceForecast, UnifiedForecast};
pub use provider::{ForecastSource, ProviderId, sources_from_config};
pub use weights::SourceWeights;
