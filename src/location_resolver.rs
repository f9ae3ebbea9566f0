//! Location Resolution Module
//!
//! This module resolves human-entered place names into MeteoSIX location
//! ids, backed by the persisted place cache so a resolved name is never
//! searched again.

use crate::api::PlaceSearch;
use crate::error::EtlError;
use crate::models::{PlaceFeature, ResolvedPlace, normalize_query};
use crate::state::StateStore;
use crate::Result;
use std::collections::HashSet;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Service for resolving place queries
pub struct PlaceResolver<'a, S: PlaceSearch> {
    search: &'a S,
    store: &'a StateStore,
    delay: Duration,
}

impl<'a, S: PlaceSearch> PlaceResolver<'a, S> {
    /// `delay` separates consecutive network calls
    pub fn new(search: &'a S, store: &'a StateStore, delay: Duration) -> Self {
        Self {
            search,
            store,
            delay,
        }
    }

    /// Resolve `queries` in order, one entry per distinct normalized query.
    ///
    /// Cached entries with an id are reused without a network call. An empty
    /// search result is recorded as unresolved and does not stop the loop; an
    /// HTTP or provider error does, and in that case nothing is saved. The
    /// full cache is written once at the end.
    pub fn resolve(&self, queries: &[String], place_type: &str) -> Result<Vec<ResolvedPlace>> {
        let mut cache = self.store.load_places()?;
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        let mut called_before = false;

        for query in queries {
            if !seen.insert(normalize_query(query)) {
                continue;
            }

            if let Some(place) = cache.resolved(query) {
                debug!("Using cached location for '{}': {:?}", query, place.id);
                resolved.push(place.clone());
                continue;
            }

            if called_before && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            called_before = true;

            debug!("Searching place: {}", query);
            let collection = self.search.find_places(query, place_type)?;

            let place = match pick_best_feature(query, &collection.features) {
                Some(feature) => ResolvedPlace::from_feature(query, feature),
                None => ResolvedPlace::unresolved(query),
            };

            if place.is_resolved() {
                info!(
                    "Resolved '{}' -> id={} ({}, {})",
                    query,
                    place.id.as_deref().unwrap_or_default(),
                    place.name.as_deref().unwrap_or_default(),
                    place.province.as_deref().unwrap_or_default()
                );
            } else {
                warn!("No place found for '{}'", query);
            }

            cache.insert(place.clone());
            resolved.push(place);
        }

        self.store.save_places(&cache)?;
        Ok(resolved)
    }
}

/// Pick the search hit for `query`.
///
/// The first feature whose name normalizes to the query wins; otherwise the
/// provider's first (most relevant) feature is used.
#[must_use]
pub fn pick_best_feature<'f>(query: &str, features: &'f [PlaceFeature]) -> Option<&'f PlaceFeature> {
    let wanted = normalize_query(query);
    features
        .iter()
        .find(|feature| {
            feature
                .properties
                .name
                .as_deref()
                .is_some_and(|name| normalize_query(name) == wanted)
        })
        .or_else(|| features.first())
}

/// Location ids of the resolved places, in order and without repeats.
///
/// Fails when nothing resolved, since there is nothing to fetch.
pub fn location_ids(places: &[ResolvedPlace]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = places
        .iter()
        .filter_map(|place| place.id.clone())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect();

    if ids.is_empty() {
        return Err(EtlError::NoLocations {
            queries: places.len(),
        });
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateConfig;
    use crate::models::{PlaceCollection, PlaceProperties};
    use crate::state::PlaceCache;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn named(name: &str, id: &str) -> PlaceFeature {
        PlaceFeature {
            properties: PlaceProperties {
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                ..PlaceProperties::default()
            },
        }
    }

    struct FakeSearch {
        results: HashMap<String, Vec<PlaceFeature>>,
        calls: RefCell<Vec<String>>,
    }

    impl PlaceSearch for FakeSearch {
        fn find_places(&self, query: &str, _place_type: &str) -> Result<PlaceCollection> {
            self.calls.borrow_mut().push(query.to_string());
            Ok(PlaceCollection {
                features: self.results.get(query).cloned().unwrap_or_default(),
                exception: None,
            })
        }
    }

    /// Answers `Vigo` and fails on any other query
    struct FlakySearch;

    impl PlaceSearch for FlakySearch {
        fn find_places(&self, query: &str, _place_type: &str) -> Result<PlaceCollection> {
            if query == "Vigo" {
                return Ok(PlaceCollection {
                    features: vec![named("Vigo", "36057")],
                    exception: None,
                });
            }
            Err(EtlError::api("findPlaces: 503 Service Unavailable"))
        }
    }

    fn store(dir: &TempDir) -> StateStore {
        StateStore::new(&StateConfig {
            ledger_path: dir.path().join("etl_state.json"),
            places_path: dir.path().join("places.json"),
        })
    }

    #[test]
    fn test_exact_match_wins_over_first() {
        let features = vec![named("Vigo (Centro)", "1"), named("Vigo", "2")];
        let best = pick_best_feature("vigo", &features).unwrap();
        assert_eq!(best.properties.id.as_deref(), Some("2"));
    }

    #[test]
    fn test_falls_back_to_first_feature() {
        let features = vec![named("Baiona (Praia)", "7"), named("Baiona Vella", "8")];
        let best = pick_best_feature("baiona", &features).unwrap();
        assert_eq!(best.properties.id.as_deref(), Some("7"));
        assert!(pick_best_feature("baiona", &[]).is_none());
    }

    #[test]
    fn test_resolve_caches_and_records_misses() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let search = FakeSearch {
            results: HashMap::from([("Vigo".to_string(), vec![named("Vigo", "36057")])]),
            calls: RefCell::new(Vec::new()),
        };
        let resolver = PlaceResolver::new(&search, &store, Duration::ZERO);

        let queries = vec!["Vigo".to_string(), "Atlantis".to_string(), " vigo ".to_string()];
        let places = resolver.resolve(&queries, "locality").unwrap();

        assert_eq!(places.len(), 2);
        assert_eq!(places[0].id.as_deref(), Some("36057"));
        assert!(!places[1].is_resolved());
        assert_eq!(*search.calls.borrow(), vec!["Vigo", "Atlantis"]);

        let cache = store.load_places().unwrap();
        assert!(cache.resolved("vigo").is_some());
        assert!(cache.get("atlantis").is_some());

        // second run: only the miss is searched again
        resolver.resolve(&queries, "locality").unwrap();
        assert_eq!(*search.calls.borrow(), vec!["Vigo", "Atlantis", "Atlantis"]);
    }

    #[test]
    fn test_search_failure_aborts_without_saving() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let mut cache = PlaceCache::default();
        cache.insert(ResolvedPlace {
            id: Some("15036".into()),
            ..ResolvedPlace::unresolved("ferrol")
        });
        store.save_places(&cache).unwrap();
        let before = std::fs::read_to_string(store.places_path()).unwrap();

        let resolver = PlaceResolver::new(&FlakySearch, &store, Duration::ZERO);
        let queries = vec!["Vigo".to_string(), "Lugo".to_string()];
        let err = resolver.resolve(&queries, "locality").unwrap_err();

        assert!(matches!(err, EtlError::Api { .. }));
        assert_eq!(std::fs::read_to_string(store.places_path()).unwrap(), before);
        assert!(store.load_places().unwrap().get("vigo").is_none());
    }

    #[test]
    fn test_location_ids_dedup_and_fail_when_empty() {
        let mut a = ResolvedPlace::unresolved("a");
        a.id = Some("1".into());
        let mut b = ResolvedPlace::unresolved("b");
        b.id = Some("1".into());
        let c = ResolvedPlace::unresolved("c");

        assert_eq!(location_ids(&[a, b, c.clone()]).unwrap(), vec!["1"]);
        assert!(matches!(
            location_ids(&[c]),
            Err(EtlError::NoLocations { queries: 1 })
        ));
    }
}
