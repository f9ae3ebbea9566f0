//! Permissive deserializers for provider payloads
//!
//! MeteoSIX fields are frequently `null`, missing, or typed inconsistently
//! (ids arrive as strings or numbers). These helpers turn that into plain
//! `Option`s and empty collections at the serde boundary.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Treats an explicit `null` the same as a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts any JSON scalar and keeps its string form.
pub fn string_like<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "string_like")]
        id: Option<String>,
        #[serde(default, deserialize_with = "null_as_default")]
        items: Vec<u32>,
    }

    #[test]
    fn test_numbers_become_strings() {
        let sample: Sample = serde_json::from_str(r#"{"id": 71953, "items": null}"#).unwrap();
        assert_eq!(sample.id.as_deref(), Some("71953"));
        assert!(sample.items.is_empty());
    }

    #[test]
    fn test_missing_and_null() {
        let sample: Sample = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(sample.id, None);
        assert!(sample.items.is_empty());
    }
}
