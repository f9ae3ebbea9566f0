//! Error types and handling for the MeteoSIX ETL

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the ETL pipeline
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration-related errors, including missing credentials
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Call-level exception reported by the forecast provider
    #[error("API error: {message}")]
    Api { message: String },

    /// Transport failure or non-success HTTP status
    #[error("HTTP request failed for {context}")]
    Http {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// Response body did not have the expected shape
    #[error("Unexpected response from {context}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Persisted state document could not be read or written
    #[error("State file '{path}' could not be {action}")]
    State {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Time-series write rejected by the storage engine
    #[error("Time-series write failed: {message}")]
    Write { message: String },

    /// Every place query failed to resolve
    #[error("No location id could be resolved from {queries} place queries")]
    NoLocations { queries: usize },
}

impl EtlError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new write error
    pub fn write<S: Into<String>>(message: S) -> Self {
        Self::Write {
            message: message.into(),
        }
    }

    pub fn http<S: Into<String>>(context: S, source: reqwest::Error) -> Self {
        Self::Http {
            context: context.into(),
            source,
        }
    }

    pub fn decode<S: Into<String>>(context: S, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }

    pub fn state<E>(path: impl Into<PathBuf>, action: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::State {
            path: path.into(),
            action,
            source: Box::new(source),
        }
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            EtlError::Config { message } => {
                format!("Configuration error: {message}. Check your config file and environment.")
            }
            EtlError::Api { message } => format!("The forecast provider rejected the request: {message}"),
            EtlError::Http { .. } => {
                "Unable to reach an external service. Please check your network connection."
                    .to_string()
            }
            EtlError::Decode { .. } => {
                "The forecast provider returned data in an unexpected format.".to_string()
            }
            EtlError::State { path, .. } => {
                format!("State file {} is unusable. Check its permissions or remove it.", path.display())
            }
            EtlError::Write { .. } => {
                "Writing to the time-series database failed. Check the Influx settings.".to_string()
            }
            EtlError::NoLocations { .. } => {
                "No location could be resolved. Check METEOSIX_API_KEY or the place names.".to_string()
            }
        }
    }
}
