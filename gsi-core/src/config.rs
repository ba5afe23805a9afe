//! Client configuration: endpoints per protocol, timeouts and retries.
//!
//! A [`ClientConfig`] is read from a JSON or YAML file with [`ClientConfig::from_file`], or from
//! the environment with [`ClientConfig::from_env`]:
//!
//! | variable                       | field              |
//! |--------------------------------|--------------------|
//! | `INTERACTIVE_REST_ENDPOINT`    | `rest_endpoint`    |
//! | `INTERACTIVE_GRPC_ENDPOINT`    | `grpc_endpoint`    |
//! | `INTERACTIVE_CYPHER_ENDPOINT`  | `cypher_endpoint`  |
//! | `INTERACTIVE_CYPHER_DATABASE`  | `cypher_database`  |
//! | `INTERACTIVE_GREMLIN_ENDPOINT` | `gremlin_endpoint` |
//! | `INTERACTIVE_TIMEOUT_MS`       | `timeout_ms`       |
//! | `INTERACTIVE_MAX_ATTEMPTS`     | `retry.max_attempts` |
use crate::client::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};

pub const REST_ENDPOINT_VAR: &str = "INTERACTIVE_REST_ENDPOINT";
pub const GRPC_ENDPOINT_VAR: &str = "INTERACTIVE_GRPC_ENDPOINT";
pub const CYPHER_ENDPOINT_VAR: &str = "INTERACTIVE_CYPHER_ENDPOINT";
pub const CYPHER_DATABASE_VAR: &str = "INTERACTIVE_CYPHER_DATABASE";
pub const GREMLIN_ENDPOINT_VAR: &str = "INTERACTIVE_GREMLIN_ENDPOINT";
pub const TIMEOUT_MS_VAR: &str = "INTERACTIVE_TIMEOUT_MS";
pub const MAX_ATTEMPTS_VAR: &str = "INTERACTIVE_MAX_ATTEMPTS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': '{source}'")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config file '{path}': {message}")]
    Parse { path: String, message: String },
    #[error("Invalid value '{value}' for {var}: '{source}'")]
    InvalidNumber {
        var: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },
    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts for an idempotent operation, the first one included.
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub rest_endpoint: Option<String>,
    pub grpc_endpoint: Option<String>,
    /// Base URL of the Neo4j HTTP API, e.g. `http://localhost:7474`.
    pub cypher_endpoint: Option<String>,
    pub cypher_database: String,
    /// Gremlin Server HTTP endpoint, e.g. `http://localhost:8182/gremlin`.
    pub gremlin_endpoint: Option<String>,
    pub timeout_ms: u64,
    pub retry: RetryConfig,
    /// Sent as HTTP headers, and as metadata on gRPC calls.
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rest_endpoint: None,
            grpc_endpoint: None,
            cypher_endpoint: None,
            cypher_database: "neo4j".to_string(),
            gremlin_endpoint: None,
            timeout_ms: 30_000,
            retry: RetryConfig::default(),
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable source; unset variables keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let number = |var: &'static str| -> Result<Option<u64>, ConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse()
                        .map_err(|source| ConfigError::InvalidNumber { var, value, source })
                })
                .transpose()
        };

        let config = Self {
            rest_endpoint: lookup(REST_ENDPOINT_VAR),
            grpc_endpoint: lookup(GRPC_ENDPOINT_VAR),
            cypher_endpoint: lookup(CYPHER_ENDPOINT_VAR),
            cypher_database: lookup(CYPHER_DATABASE_VAR).unwrap_or(defaults.cypher_database),
            gremlin_endpoint: lookup(GREMLIN_ENDPOINT_VAR),
            timeout_ms: number(TIMEOUT_MS_VAR)?.unwrap_or(defaults.timeout_ms),
            retry: RetryConfig {
                max_attempts: number(MAX_ATTEMPTS_VAR)?
                    .map(|n| n as usize)
                    .unwrap_or(defaults.retry.max_attempts),
                ..defaults.retry
            },
            headers: defaults.headers,
        };

        config.validate()
    }

    /// Reads a JSON or YAML config file; anything but `.json` is parsed as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;

        let is_json = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let config: Self = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_saphyr::from_str(&content).map_err(|e| e.to_string())
        }
        .map_err(|message| ConfigError::Parse {
            path: display,
            message,
        })?;

        config.validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            min_delay: Duration::from_millis(self.retry.min_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub(crate) fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
