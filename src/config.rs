//! Configuration management for the MeteoSIX ETL
//!
//! Handles loading configuration from an optional TOML file and environment
//! variables, and provides validation for all configuration settings.
//! Credentials are optional here; each client checks its own before any
//! network activity.

use crate::EtlError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest number of location ids the forecast endpoint accepts per request
pub const PROVIDER_MAX_IDS_PER_REQUEST: usize = 20;

/// Prefix for structured environment overrides, e.g. `METEOSIX_ETL__INFLUX__BUCKET`
pub const ENV_PREFIX: &str = "METEOSIX_ETL";

/// Flat environment names honoured for compatibility with existing deployments
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("METEOSIX_API_KEY", "meteosix.api_key"),
    ("INFLUX_URL", "influx.url"),
    ("INFLUX_TOKEN", "influx.token"),
    ("INFLUX_ORG", "influx.org"),
    ("INFLUX_BUCKET", "influx.bucket"),
    ("ETL_STATE_PATH", "state.ledger_path"),
    ("PLACES_PATH", "state.places_path"),
];

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EtlConfig {
    /// MeteoSIX API configuration
    #[serde(default)]
    pub meteosix: MeteoSixConfig,
    /// InfluxDB write target
    #[serde(default)]
    pub influx: InfluxConfig,
    /// Locations of the persisted state documents
    #[serde(default)]
    pub state: StateConfig,
    /// Incremental ETL settings
    #[serde(default)]
    pub etl: EtlSettings,
    /// Continuous poller settings
    #[serde(default)]
    pub poller: PollerConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MeteoSIX API configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeteoSixConfig {
    /// API key, required by every endpoint
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_format")]
    pub exceptions_format: String,
    /// Timeout for `findPlaces` in seconds
    #[serde(default = "default_search_timeout")]
    pub search_timeout_seconds: u64,
    /// Timeout for `getNumericForecastInfo` in seconds
    #[serde(default = "default_forecast_timeout")]
    pub forecast_timeout_seconds: u64,
}

/// InfluxDB v2 settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    #[serde(default = "default_influx_url")]
    pub url: String,
    pub token: Option<String>,
    #[serde(default = "default_influx_org")]
    pub org: String,
    #[serde(default = "default_influx_bucket")]
    pub bucket: String,
    #[serde(default = "default_influx_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Batch key -> response digest ledger
    #[serde(default = "default_ledger_path")]
    pub ledger_path: PathBuf,
    /// Normalized query -> resolved place cache
    #[serde(default = "default_places_path")]
    pub places_path: PathBuf,
}

/// Incremental ETL settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlSettings {
    #[serde(default = "default_max_ids")]
    pub max_ids_per_request: usize,
    /// `types` filter passed to `findPlaces`
    #[serde(default = "default_place_type")]
    pub place_type: String,
    /// Forecast variables to request
    #[serde(default = "default_variables")]
    pub variables: Vec<String>,
    /// Place queries resolved when none are given on the command line
    #[serde(default = "default_places")]
    pub places: Vec<String>,
    /// Pause between consecutive `findPlaces` calls
    #[serde(default = "default_place_search_delay")]
    pub place_search_delay_ms: u64,
    /// Pause between consecutive forecast batches
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
}

/// A fixed coordinate polled by the continuous poller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollLocation {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

/// Continuous poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// `getWeatherInfo` endpoint
    #[serde(default = "default_poller_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_poller_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_poller_variables")]
    pub variables: Vec<String>,
    #[serde(default = "default_poll_locations")]
    pub locations: Vec<PollLocation>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_base_url() -> String {
    "https://servizos.meteogalicia.gal/apiv5".to_string()
}

fn default_lang() -> String {
    "es".to_string()
}

fn default_format() -> String {
    "application/json".to_string()
}

fn default_search_timeout() -> u64 {
    30
}

fn default_forecast_timeout() -> u64 {
    60
}

fn default_influx_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_influx_org() -> String {
    "hackudc".to_string()
}

fn default_influx_bucket() -> String {
    "meteosix".to_string()
}

fn default_influx_timeout() -> u64 {
    30
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("etl_state.json")
}

fn default_places_path() -> PathBuf {
    PathBuf::from("places.json")
}

fn default_max_ids() -> usize {
    PROVIDER_MAX_IDS_PER_REQUEST
}

fn default_place_type() -> String {
    "locality".to_string()
}

fn default_variables() -> Vec<String> {
    [
        "temperature",
        "relative_humidity",
        "air_pressure_at_sea_level",
        "precipitation_amount",
        "cloud_area_fraction",
        "wind",
        // sea variables come back empty for inland places
        "significative_wave_height",
        "relative_peak_period",
        "mean_wave_direction",
        "sea_water_temperature",
    ]
    .map(String::from)
    .to_vec()
}

fn default_places() -> Vec<String> {
    [
        "a coruña",
        "vigo",
        "santiago de compostela",
        "ferrol",
        "pontevedra",
        "lugo",
        "ourense",
        "baiona",
        "ribeira",
        "cedeira",
        "fisterra",
        "malpica",
        "sanxenxo",
        "cambados",
        "viveiro",
        "o grove",
        "cangas",
        "mondonedo",
        "a guarda",
        "xinzo",
    ]
    .map(String::from)
    .to_vec()
}

fn default_place_search_delay() -> u64 {
    200
}

fn default_batch_delay() -> u64 {
    500
}

fn default_poller_endpoint() -> String {
    "https://servizos.meteogalicia.gal/mf-meteosix-api/getWeatherInfo".to_string()
}

fn default_poll_interval() -> u64 {
    600
}

fn default_poller_timeout() -> u64 {
    15
}

fn default_poller_variables() -> Vec<String> {
    [
        "temperature",
        "wind_module",
        "wind_direction",
        "relative_humidity",
        "precipitation_amount",
        "cloud_area_fraction",
        "air_pressure_at_sea_level",
    ]
    .map(String::from)
    .to_vec()
}

fn default_poll_locations() -> Vec<PollLocation> {
    vec![
        PollLocation {
            name: "Santiago".to_string(),
            lon: -8.5448,
            lat: 42.8782,
        },
        PollLocation {
            name: "Vigo".to_string(),
            lon: -8.7207,
            lat: 42.2328,
        },
        PollLocation {
            name: "Coruña".to_string(),
            lon: -8.4115,
            lat: 43.3713,
        },
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for MeteoSixConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            lang: default_lang(),
            format: default_format(),
            exceptions_format: default_format(),
            search_timeout_seconds: default_search_timeout(),
            forecast_timeout_seconds: default_forecast_timeout(),
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: default_influx_url(),
            token: None,
            org: default_influx_org(),
            bucket: default_influx_bucket(),
            timeout_seconds: default_influx_timeout(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            ledger_path: default_ledger_path(),
            places_path: default_places_path(),
        }
    }
}

impl Default for EtlSettings {
    fn default() -> Self {
        Self {
            max_ids_per_request: default_max_ids(),
            place_type: default_place_type(),
            variables: default_variables(),
            places: default_places(),
            place_search_delay_ms: default_place_search_delay(),
            batch_delay_ms: default_batch_delay(),
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_poller_endpoint(),
            interval_seconds: default_poll_interval(),
            timeout_seconds: default_poller_timeout(),
            variables: default_poller_variables(),
            locations: default_poll_locations(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl EtlSettings {
    #[must_use]
    pub fn place_search_delay(&self) -> Duration {
        Duration::from_millis(self.place_search_delay_ms)
    }

    #[must_use]
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl EtlConfig {
    /// Load configuration from `config_path` (or the default file location)
    /// and the process environment
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path()
                .filter(|path| path.exists())
                .unwrap_or_else(|| PathBuf::from("meteosix-etl.toml"))
        });
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_from(&config_file, &env)
    }

    /// Load configuration from a file (if it exists) and an explicit environment
    pub fn load_from(config_file: &Path, env: &HashMap<String, String>) -> Result<Self> {
        let mut builder = Config::builder();

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        let prefixed: config::Map<String, String> = env
            .iter()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        // Structured overrides, e.g. METEOSIX_ETL__ETL__VARIABLES=temperature,wind
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("etl.variables")
                .with_list_parse_key("etl.places")
                .with_list_parse_key("poller.variables")
                .source(Some(prefixed)),
        );

        for (env_key, config_key) in LEGACY_ENV_KEYS {
            let value = env.get(*env_key).filter(|v| !v.is_empty()).cloned();
            builder = builder
                .set_override_option(*config_key, value)
                .with_context(|| format!("Failed to apply {env_key}"))?;
        }
        // the poller historically read its key from METEOSIX_KEY
        if !env.contains_key("METEOSIX_API_KEY") {
            let value = env.get("METEOSIX_KEY").filter(|v| !v.is_empty()).cloned();
            builder = builder
                .set_override_option("meteosix.api_key", value)
                .with_context(|| "Failed to apply METEOSIX_KEY")?;
        }

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: EtlConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        // Apply defaults for missing values
        config.apply_defaults();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("meteosix-etl").join("config.toml"))
    }

    /// Apply default values to blank configuration fields
    pub fn apply_defaults(&mut self) {
        if self.meteosix.base_url.is_empty() {
            self.meteosix.base_url = default_base_url();
        }
        if self.meteosix.lang.is_empty() {
            self.meteosix.lang = default_lang();
        }
        if self.meteosix.search_timeout_seconds == 0 {
            self.meteosix.search_timeout_seconds = default_search_timeout();
        }
        if self.meteosix.forecast_timeout_seconds == 0 {
            self.meteosix.forecast_timeout_seconds = default_forecast_timeout();
        }
        if self.influx.url.is_empty() {
            self.influx.url = default_influx_url();
        }
        if self.etl.max_ids_per_request == 0 {
            self.etl.max_ids_per_request = default_max_ids();
        }
        if self.etl.place_type.is_empty() {
            self.etl.place_type = default_place_type();
        }
        if self.poller.interval_seconds == 0 {
            self.poller.interval_seconds = default_poll_interval();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.etl.max_ids_per_request > PROVIDER_MAX_IDS_PER_REQUEST {
            return Err(EtlError::config(format!(
                "max_ids_per_request cannot exceed the provider limit of {PROVIDER_MAX_IDS_PER_REQUEST}"
            ))
            .into());
        }

        if self.meteosix.forecast_timeout_seconds > 300 || self.meteosix.search_timeout_seconds > 300 {
            return Err(EtlError::config("MeteoSIX timeout cannot exceed 300 seconds").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(EtlError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(EtlError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        for (name, url) in [
            ("MeteoSIX base URL", &self.meteosix.base_url),
            ("Influx URL", &self.influx.url),
            ("Poller endpoint", &self.poller.endpoint),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(
                    EtlError::config(format!("{name} must be a valid HTTP or HTTPS URL")).into(),
                );
            }
        }

        if self.etl.variables.iter().all(|v| v.trim().is_empty()) {
            return Err(EtlError::config("At least one forecast variable is required").into());
        }

        Ok(())
    }
}
