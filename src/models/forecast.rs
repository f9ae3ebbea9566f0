//! Numeric forecast payload (`getNumericForecastInfo`)
//!
//! The provider answers with a GeoJSON feature collection: one feature per
//! location id, each holding days, each day holding variables, each variable
//! holding hourly values. Every level may be missing or `null`.

use super::lenient::{null_as_default, string_like};
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;

/// Forecast envelope
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<ForecastFeature>,
    /// Whole-request failure reported inside a 200 response
    #[serde(default)]
    pub exception: Option<Value>,
}

/// One location's forecast, or the per-location exception that replaced it
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastFeature {
    #[serde(default)]
    pub exception: Option<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: ForecastProperties,
}

impl ForecastFeature {
    /// The provider's error marker, if this feature carries one
    #[must_use]
    pub fn error_marker(&self) -> Option<&Value> {
        self.exception.as_ref().filter(|marker| is_truthy(marker))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastProperties {
    #[serde(default, deserialize_with = "string_like")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub municipality: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub province: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "string_like")]
    pub place_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub days: Vec<ForecastDay>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastDay {
    #[serde(default, deserialize_with = "null_as_default")]
    pub variables: Vec<ForecastVariable>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastVariable {
    #[serde(default, deserialize_with = "string_like")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub grid: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub units: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<HourlyValue>,
}

/// A single hourly reading
///
/// Scalar variables carry `value`; the wind variable carries
/// `moduleValue` and `directionValue` instead.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyValue {
    #[serde(default, deserialize_with = "string_like")]
    pub time_instant: Option<String>,
    #[serde(default)]
    pub value: Option<ScalarValue>,
    #[serde(default)]
    pub module_value: Option<ScalarValue>,
    #[serde(default)]
    pub direction_value: Option<ScalarValue>,
    #[serde(default, deserialize_with = "string_like")]
    pub model_run: Option<String>,
}

/// A reading as sent by the provider: usually a number, sometimes text
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
    Other(Value),
}

impl ScalarValue {
    /// Finite numeric reading, parsing text when needed
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        let parsed = match self {
            ScalarValue::Number(n) => Some(*n),
            ScalarValue::Text(s) => s.trim().parse::<f64>().ok(),
            ScalarValue::Other(_) => None,
        };
        parsed.filter(|n| n.is_finite())
    }

    /// Empty text counts as no reading at all
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, ScalarValue::Text(s) if s.is_empty())
    }

    /// Original representation, kept when the reading is not numeric
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            ScalarValue::Number(n) => n.to_string(),
            ScalarValue::Text(s) => s.clone(),
            ScalarValue::Other(v) => v.to_string(),
        }
    }
}

/// Parse a MeteoSIX `timeInstant` (`yyyy-MM-ddTHH:mm:ssZZ`).
///
/// The offset may be `Z`, `+01:00`, `+0100` or just `+01`. Timestamps without
/// any offset are taken as UTC.
#[must_use]
pub fn parse_time_instant(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%#z"))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc().fixed_offset())
        })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}
