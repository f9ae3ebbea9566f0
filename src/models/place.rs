//! Place queries and place-search results

use super::lenient::{null_as_default, string_like};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalize a free-text place query into its cache key.
///
/// Trims surrounding whitespace and lowercases; applying it twice is a no-op.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// A place query resolved (or not) to a MeteoSIX location id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPlace {
    /// Query text as entered by the user
    pub query: String,
    /// Location id, `None` when resolution failed
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default, rename = "type")]
    pub place_type: Option<String>,
}

impl ResolvedPlace {
    /// Entry recorded when the provider returned no candidates
    #[must_use]
    pub fn unresolved(query: &str) -> Self {
        Self {
            query: query.to_string(),
            id: None,
            name: None,
            municipality: None,
            province: None,
            place_type: None,
        }
    }

    /// Build a resolved entry from a search hit
    #[must_use]
    pub fn from_feature(query: &str, feature: &PlaceFeature) -> Self {
        let props = &feature.properties;
        let id = props
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        Self {
            query: query.to_string(),
            id,
            name: props.name.clone(),
            municipality: props.municipality.clone(),
            province: props.province.clone(),
            place_type: props.place_type.clone(),
        }
    }

    /// Whether this entry carries a usable location id
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// `findPlaces` response body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceCollection {
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<PlaceFeature>,
    #[serde(default)]
    pub exception: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceFeature {
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: PlaceProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceProperties {
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
}
