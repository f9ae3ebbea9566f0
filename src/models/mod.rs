//! Data models for the MeteoSIX ETL
//!
//! This module contains the domain models organized by concern:
//! - Place: place queries, search results and resolved places
//! - Forecast: the nested numeric forecast payload
//! - Point: flat time-series points ready for storage

pub mod forecast;
pub mod lenient;
pub mod place;
pub mod point;

// Re-export all public types for convenient access
pub use forecast::{
    ForecastDay, ForecastFeature, ForecastProperties, ForecastResponse, ForecastVariable,
    HourlyValue, ScalarValue, parse_time_instant,
};
pub use place::{PlaceCollection, PlaceFeature, PlaceProperties, ResolvedPlace, normalize_query};
pub use point::{FieldValue, TimeSeriesPoint};
