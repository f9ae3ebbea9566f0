//! `meteosix-etl` - incremental MeteoSIX forecast loader for InfluxDB
//!
//! This library resolves place names to MeteoSIX location ids, fetches
//! numeric forecasts in provider-sized batches, skips batches whose response
//! has not changed since the last run, and flattens the nested forecast into
//! time-series points for InfluxDB.

pub mod api;
pub mod batch;
pub mod change_detector;
pub mod config;
pub mod error;
pub mod etl;
pub mod influx;
pub mod location_resolver;
pub mod logging;
pub mod models;
pub mod poller;
pub mod state;
pub mod transform;

// Re-export core types for public API
pub use api::{ForecastSource, MeteoSixClient, PlaceSearch, WeatherInfoSource};
pub use batch::{ForecastBatch, chunk};
pub use config::EtlConfig;
pub use error::EtlError;
pub use etl::{BatchOutcome, EtlPipeline, RunSummary};
pub use influx::{InfluxWriter, TimeSeriesWriter};
pub use location_resolver::{PlaceResolver, location_ids};
pub use models::{FieldValue, ResolvedPlace, TimeSeriesPoint};
pub use poller::Poller;
pub use state::{BatchLedger, PlaceCache, StateStore};
pub use transform::{FeatureOutcome, ForecastTransformer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, EtlError>;
