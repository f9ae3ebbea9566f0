//! Flat time-series points

use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;

/// Measured value of a point field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Text(String),
}

/// A timestamped, tagged measurement
///
/// Always carries at least one field; [`TimeSeriesPoint::new`] refuses to
/// build a point otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesPoint {
    measurement: String,
    timestamp: DateTime<FixedOffset>,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
}

impl TimeSeriesPoint {
    /// Build a point, or `None` when there is nothing to store
    #[must_use]
    pub fn new(
        measurement: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        tags: BTreeMap<String, String>,
        fields: BTreeMap<String, FieldValue>,
    ) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        Some(Self {
            measurement: measurement.into(),
            timestamp,
            tags,
            fields,
        })
    }

    #[must_use]
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
}
