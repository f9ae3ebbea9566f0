//! MeteoSIX API client
//!
//! Blocking HTTP access to the three provider endpoints the ETL uses:
//! `findPlaces`, `getNumericForecastInfo` and (for the poller)
//! `getWeatherInfo`. Each capability sits behind a small trait so the
//! resolver, pipeline and poller can run against in-memory fakes.
//!
//! There are no retries: a timeout or non-success status is returned to the
//! caller as-is.

use crate::batch::ForecastBatch;
use crate::config::{MeteoSixConfig, PollLocation, PollerConfig};
use crate::error::EtlError;
use crate::models::{ForecastResponse, PlaceCollection};
use crate::Result;
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Place search collaborator (`findPlaces`)
pub trait PlaceSearch {
    /// Search places matching `query`, filtered by `place_type`
    fn find_places(&self, query: &str, place_type: &str) -> Result<PlaceCollection>;
}

/// Forecast collaborator (`getNumericForecastInfo`)
pub trait ForecastSource {
    /// Fetch the raw forecast document for one batch
    ///
    /// The raw JSON is returned untouched so it can be fingerprinted before
    /// it is decoded.
    fn fetch_forecast(&self, batch: &ForecastBatch, variables: &[String]) -> Result<Value>;
}

/// Point-forecast collaborator used by the poller (`getWeatherInfo`)
pub trait WeatherInfoSource {
    fn weather_info(&self, location: &PollLocation, variables: &[String])
    -> Result<ForecastResponse>;
}

/// MeteoSIX API client
pub struct MeteoSixClient {
    /// HTTP client
    client: Client,
    /// API configuration
    config: MeteoSixConfig,
    api_key: String,
    poller_endpoint: String,
    poller_timeout: Duration,
}

impl MeteoSixClient {
    /// Create a new client; fails before any request when no API key is configured
    pub fn new(config: &MeteoSixConfig, poller: &PollerConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| EtlError::config("Missing METEOSIX_API_KEY"))?
            .to_string();

        let client = Client::builder()
            .user_agent(concat!("meteosix-etl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EtlError::http("building the HTTP client", e))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
            poller_endpoint: poller.endpoint.clone(),
            poller_timeout: Duration::from_secs(poller.timeout_seconds),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), name)
    }

    /// Parameters shared by the apiv5 endpoints, credential first
    fn common_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("API_KEY", self.api_key.clone()),
            ("lang", self.config.lang.clone()),
            ("format", self.config.format.clone()),
            ("exceptionsFormat", self.config.exceptions_format.clone()),
        ]
    }

    /// GET `endpoint` and return its JSON body, failing on call-level exceptions
    fn get_json(
        &self,
        endpoint: &str,
        params: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<Value> {
        let url = Url::parse_with_params(endpoint, params)
            .map_err(|e| EtlError::config(format!("Invalid endpoint '{endpoint}': {e}")))?;

        debug!(
            "GET {} {:?}",
            endpoint,
            params
                .iter()
                .filter(|(name, _)| *name != "API_KEY")
                .collect::<Vec<_>>()
        );
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| EtlError::http(endpoint, e.without_url()))?;

        let body: Value = response
            .json()
            .map_err(|e| EtlError::http(endpoint, e.without_url()))?;

        let elapsed = start.elapsed();
        debug!("{} answered in {:.3}s", endpoint, elapsed.as_secs_f64());
        if elapsed.as_secs() > 10 {
            warn!("Slow API response detected: {:.3}s", elapsed.as_secs_f64());
        }

        if let Some(exception) = body.get("exception").filter(|e| !e.is_null()) {
            return Err(EtlError::api(format!("{endpoint}: {exception}")));
        }
        Ok(body)
    }
}

impl PlaceSearch for MeteoSixClient {
    #[instrument(skip(self))]
    fn find_places(&self, query: &str, place_type: &str) -> Result<PlaceCollection> {
        let endpoint = self.endpoint("findPlaces");
        let mut params = self.common_params();
        params.push(("location", query.to_string()));
        params.push(("types", place_type.to_string()));

        let body = self.get_json(
            &endpoint,
            &params,
            Duration::from_secs(self.config.search_timeout_seconds),
        )?;
        PlaceCollection::deserialize(&body).map_err(|e| EtlError::decode(endpoint, e))
    }
}

impl ForecastSource for MeteoSixClient {
    #[instrument(skip(self, batch, variables), fields(batch = %batch.key()))]
    fn fetch_forecast(&self, batch: &ForecastBatch, variables: &[String]) -> Result<Value> {
        let endpoint = self.endpoint("getNumericForecastInfo");
        let mut params = self.common_params();
        params.push(("locationIds", batch.key()));
        params.push(("variables", variables.join(",")));

        let body = self.get_json(
            &endpoint,
            &params,
            Duration::from_secs(self.config.forecast_timeout_seconds),
        )?;
        info!("Fetched forecast for {} locations", batch.len());
        Ok(body)
    }
}

impl WeatherInfoSource for MeteoSixClient {
    #[instrument(skip(self, variables), fields(location = %location.name))]
    fn weather_info(
        &self,
        location: &PollLocation,
        variables: &[String],
    ) -> Result<ForecastResponse> {
        let params = vec![
            ("lonlat", format!("{},{}", location.lon, location.lat)),
            ("variables", variables.join(",")),
            ("API_KEY", self.api_key.clone()),
            ("format", self.config.format.clone()),
        ];

        let body = self.get_json(&self.poller_endpoint, &params, self.poller_timeout)?;
        ForecastResponse::deserialize(&body)
            .map_err(|e| EtlError::decode(self.poller_endpoint.as_str(), e))
    }
}
