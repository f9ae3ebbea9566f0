//! Forecast Transformation Module
//!
//! Flattens one place's nested forecast (days -> variables -> hourly values)
//! into `forecast_hourly` time-series points.

use crate::models::{
    FieldValue, ForecastFeature, ForecastProperties, ForecastVariable, HourlyValue,
    TimeSeriesPoint, parse_time_instant,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Measurement name of every point produced here
pub const FORECAST_MEASUREMENT: &str = "forecast_hourly";

/// Variable whose readings come as module/direction pairs
pub const WIND_VARIABLE: &str = "wind";

/// Result of transforming a single feature
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureOutcome {
    /// Points extracted from the feature (possibly none)
    Points(Vec<TimeSeriesPoint>),
    /// The provider reported an error for this place
    Skipped(String),
}

/// Service turning forecast features into time-series points
pub struct ForecastTransformer;

impl ForecastTransformer {
    /// Transform one feature
    #[must_use]
    pub fn transform(feature: &ForecastFeature) -> FeatureOutcome {
        if let Some(marker) = feature.error_marker() {
            return FeatureOutcome::Skipped(marker.to_string());
        }

        let props = &feature.properties;
        let place_tags = Self::place_tags(props);
        let mut points = Vec::new();

        for day in &props.days {
            for variable in &day.variables {
                let tags = Self::variable_tags(&place_tags, variable);
                let is_wind = variable.name.as_deref() == Some(WIND_VARIABLE);

                for hourly in &variable.values {
                    if let Some(point) = Self::hourly_point(&tags, is_wind, hourly) {
                        points.push(point);
                    }
                }
            }
        }

        FeatureOutcome::Points(points)
    }

    fn place_tags(props: &ForecastProperties) -> BTreeMap<String, String> {
        let id = props.id.as_deref().map(str::trim);
        BTreeMap::from([
            tag("place_id", id),
            tag("place_name", props.name.as_deref()),
            tag("municipality", props.municipality.as_deref()),
            tag("province", props.province.as_deref()),
            tag("type", props.place_type.as_deref()),
        ])
    }

    fn variable_tags(
        place_tags: &BTreeMap<String, String>,
        variable: &ForecastVariable,
    ) -> BTreeMap<String, String> {
        let mut tags = place_tags.clone();
        tags.extend([
            tag("variable", variable.name.as_deref()),
            tag("model", variable.model.as_deref()),
            tag("grid", variable.grid.as_deref()),
            tag("units", variable.units.as_deref()),
        ]);
        tags
    }

    fn hourly_point(
        tags: &BTreeMap<String, String>,
        is_wind: bool,
        hourly: &HourlyValue,
    ) -> Option<TimeSeriesPoint> {
        let raw_time = hourly.time_instant.as_deref().filter(|t| !t.is_empty())?;
        let Some(timestamp) = parse_time_instant(raw_time) else {
            debug!("Dropping value with unparseable timeInstant '{}'", raw_time);
            return None;
        };

        let mut fields = if is_wind {
            Self::wind_fields(hourly)
        } else {
            Self::scalar_fields(hourly)
        };

        if let Some(run) = hourly.model_run.as_deref().filter(|r| !r.is_empty()) {
            fields.insert("model_run".to_string(), FieldValue::Text(run.to_string()));
        }

        TimeSeriesPoint::new(FORECAST_MEASUREMENT, timestamp, tags.clone(), fields)
    }

    /// Module and direction are independent; either may be missing
    fn wind_fields(hourly: &HourlyValue) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();
        for (name, component) in [
            ("wind_module", &hourly.module_value),
            ("wind_direction", &hourly.direction_value),
        ] {
            let Some(component) = component else { continue };
            match component.as_f64() {
                Some(n) => {
                    fields.insert(name.to_string(), FieldValue::Float(n));
                }
                None => debug!("Ignoring non-numeric {} '{}'", name, component.to_text()),
            }
        }
        fields
    }

    /// Numeric `value`, or the original text under `value_str`
    fn scalar_fields(hourly: &HourlyValue) -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();
        if let Some(value) = hourly.value.as_ref().filter(|v| !v.is_blank()) {
            match value.as_f64() {
                Some(n) => fields.insert("value".to_string(), FieldValue::Float(n)),
                None => fields.insert("value_str".to_string(), FieldValue::Text(value.to_text())),
            };
        }
        fields
    }
}

fn tag(key: &str, value: Option<&str>) -> (String, String) {
    (key.to_string(), value.unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScalarValue;
    use serde_json::json;

    fn feature(value: serde_json::Value) -> ForecastFeature {
        serde_json::from_value(value).unwrap()
    }

    fn single_variable(name: &str, values: serde_json::Value) -> ForecastFeature {
        feature(json!({
            "properties": {
                "id": "36057", "name": "Vigo", "municipality": "Vigo",
                "province": "Pontevedra", "type": "locality",
                "days": [{"variables": [{
                    "name": name, "model": "WRF", "grid": "12km", "units": "degc",
                    "values": values
                }]}]
            }
        }))
    }

    fn points(outcome: FeatureOutcome) -> Vec<TimeSeriesPoint> {
        match outcome {
            FeatureOutcome::Points(points) => points,
            FeatureOutcome::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn test_wind_record_yields_module_and_direction() {
        let f = single_variable(
            "wind",
            json!([{"timeInstant": "2024-03-01T10:00:00+01", "moduleValue": 12.3, "directionValue": 270}]),
        );
        let pts = points(ForecastTransformer::transform(&f));

        assert_eq!(pts.len(), 1);
        let fields = pts[0].fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("wind_module"), Some(&FieldValue::Float(12.3)));
        assert_eq!(fields.get("wind_direction"), Some(&FieldValue::Float(270.0)));
        assert!(fields.get("value").is_none());
    }

    #[test]
    fn test_wind_components_are_independent() {
        let f = single_variable(
            "wind",
            json!([
                {"timeInstant": "2024-03-01T10:00:00+01", "directionValue": 90},
                {"timeInstant": "2024-03-01T11:00:00+01"}
            ]),
        );
        let pts = points(ForecastTransformer::transform(&f));

        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].field("wind_direction"), Some(&FieldValue::Float(90.0)));
        assert!(pts[0].field("wind_module").is_none());
    }

    #[test]
    fn test_scalar_numeric_and_text_fallback() {
        let f = single_variable(
            "temperature",
            json!([
                {"timeInstant": "2024-03-01T10:00:00+01", "value": "18.5"},
                {"timeInstant": "2024-03-01T11:00:00+01", "value": "N/A"}
            ]),
        );
        let pts = points(ForecastTransformer::transform(&f));

        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0].fields().len(), 1);
        assert_eq!(pts[0].field("value"), Some(&FieldValue::Float(18.5)));
        assert_eq!(pts[1].fields().len(), 1);
        assert_eq!(pts[1].field("value_str"), Some(&FieldValue::Text("N/A".into())));
    }

    #[test]
    fn test_records_without_time_or_fields_are_dropped() {
        let f = single_variable(
            "temperature",
            json!([
                {"value": 11.0},
                {"timeInstant": "2024-03-01T10:00:00+01", "value": ""},
                {"timeInstant": "2024-03-01T11:00:00+01", "value": null},
                {"timeInstant": "2024-03-01T12:00:00+01", "value": 14.2}
            ]),
        );
        let pts = points(ForecastTransformer::transform(&f));
        assert_eq!(pts.len(), 1);
        assert_eq!(pts[0].field("value"), Some(&FieldValue::Float(14.2)));
    }

    #[test]
    fn test_model_run_is_an_extra_field() {
        let f = single_variable(
            "temperature",
            json!([
                {"timeInstant": "2024-03-01T10:00:00+01", "modelRun": "2024-03-01T00:00:00+01"},
                {"timeInstant": "2024-03-01T11:00:00+01", "value": 9, "modelRun": "2024-03-01T00:00:00+01"}
            ]),
        );
        let pts = points(ForecastTransformer::transform(&f));

        // a model run alone is still a field, so the first record is kept
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0].fields().len(), 1);
        assert_eq!(pts[1].fields().len(), 2);
        assert_eq!(
            pts[1].field("model_run"),
            Some(&FieldValue::Text("2024-03-01T00:00:00+01".into()))
        );
    }

    #[test]
    fn test_tags_cover_place_and_variable() {
        let f = single_variable(
            "temperature",
            json!([{"timeInstant": "2024-03-01T10:00:00+01", "value": 1}]),
        );
        let pts = points(ForecastTransformer::transform(&f));
        let tags = pts[0].tags();

        assert_eq!(pts[0].measurement(), FORECAST_MEASUREMENT);
        assert_eq!(tags.get("place_id").map(String::as_str), Some("36057"));
        assert_eq!(tags.get("place_name").map(String::as_str), Some("Vigo"));
        assert_eq!(tags.get("province").map(String::as_str), Some("Pontevedra"));
        assert_eq!(tags.get("type").map(String::as_str), Some("locality"));
        assert_eq!(tags.get("variable").map(String::as_str), Some("temperature"));
        assert_eq!(tags.get("model").map(String::as_str), Some("WRF"));
        assert_eq!(tags.get("grid").map(String::as_str), Some("12km"));
        assert_eq!(tags.get("units").map(String::as_str), Some("degc"));
    }

    #[test]
    fn test_missing_tags_become_empty_strings() {
        let f = feature(json!({
            "properties": {"id": 15030, "days": [{"variables": [
                {"name": "sea_water_temperature", "values": [
                    {"timeInstant": "2024-03-01T10:00:00+01", "value": 13.1}
                ]}
            ]}]}
        }));
        let pts = points(ForecastTransformer::transform(&f));
        let tags = pts[0].tags();

        assert_eq!(tags.len(), 9);
        assert_eq!(tags.get("place_id").map(String::as_str), Some("15030"));
        assert_eq!(tags.get("municipality").map(String::as_str), Some(""));
        assert_eq!(tags.get("units").map(String::as_str), Some(""));
    }

    #[test]
    fn test_feature_with_exception_is_skipped() {
        let f = feature(json!({"exception": {"message": "Location not found"}}));
        assert!(matches!(
            ForecastTransformer::transform(&f),
            FeatureOutcome::Skipped(reason) if reason.contains("Location not found")
        ));
    }

    #[test]
    fn test_multiple_days_and_variables() {
        let f = feature(json!({
            "properties": {"id": "1", "days": [
                {"variables": [
                    {"name": "temperature", "values": [{"timeInstant": "2024-03-01T10:00:00+01", "value": 1}]},
                    {"name": "wind", "values": [{"timeInstant": "2024-03-01T10:00:00+01", "moduleValue": 2}]}
                ]},
                {"variables": [
                    {"name": "temperature", "values": [{"timeInstant": "2024-03-02T10:00:00+01", "value": 3}]}
                ]}
            ]}
        }));
        let pts = points(ForecastTransformer::transform(&f));
        assert_eq!(pts.len(), 3);
        assert_eq!(pts.iter().filter(|p| p.tag("variable") == Some("wind")).count(), 1);
    }

    #[test]
    fn test_non_numeric_wind_component_is_ignored() {
        let hourly = HourlyValue {
            time_instant: Some("2024-03-01T10:00:00+01".into()),
            module_value: Some(ScalarValue::Text("calm".into())),
            direction_value: Some(ScalarValue::Number(180.0)),
            ..HourlyValue::default()
        };
        let fields = ForecastTransformer::wind_fields(&hourly);
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("wind_direction"));
    }
}
