//! Configuration types for the convergence engine
//!
//! All structures deserialize with serde defaults, so an empty JSON object
//! yields a working configuration. The library never reads the environment;
//! binaries decide where configuration comes from.

use crate::traits::PaginationSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Request executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Status poller defaults
    #[serde(default)]
    pub poller: PollerConfig,

    /// Describe-result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log) rather than
    /// blocking an engine call.
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }

        self.executor.validate()?;
        self.poller.validate()?;
        self.cache.validate()?;

        Ok(())
    }
}

/// Request executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Retry budget ceiling; reaching it raises a timeout
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Units charged per throttled attempt
    #[serde(default = "default_throttle_weight")]
    pub throttle_weight: u32,

    /// Units charged per other retryable failure
    #[serde(default = "default_failure_weight")]
    pub failure_weight: u32,

    /// Throttle backoff unit; the n-th failed attempt sleeps n units
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,

    /// Fixed sleep after a non-throttling retryable failure
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Substrings of the error signal that mean "throttled"
    #[serde(default = "default_throttling_signatures")]
    pub throttling_signatures: Vec<String>,

    /// Substrings of the error signal that are never retried
    #[serde(default = "default_permanent_signatures")]
    pub permanent_signatures: Vec<String>,

    /// Log request parameters at debug level
    ///
    /// Off by default: parameters may carry secrets.
    #[serde(default)]
    pub log_params: bool,
}

impl ExecutorConfig {
    /// Validate the executor configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.retry_ceiling == 0 {
            return Err(crate::Error::config("retry_ceiling must be > 0"));
        }
        if self.throttle_weight == 0 || self.failure_weight == 0 {
            return Err(crate::Error::config("retry weights must be > 0"));
        }
        Ok(())
    }

    /// Throttle backoff unit as a Duration
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    /// Fixed retry sleep as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: default_retry_ceiling(),
            throttle_weight: default_throttle_weight(),
            failure_weight: default_failure_weight(),
            backoff_unit_ms: default_backoff_unit_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            throttling_signatures: default_throttling_signatures(),
            permanent_signatures: default_permanent_signatures(),
            log_params: false,
        }
    }
}

/// Status poller defaults (used when a PollSpec leaves them unset)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Poll timeout (in seconds)
    #[serde(default = "default_poll_timeout_secs")]
    pub timeout_secs: u64,

    /// Interval between polls (in seconds)
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

impl PollerConfig {
    /// Validate the poller configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("poll interval must be > 0"));
        }
        Ok(())
    }

    /// Default poll timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Default poll interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_poll_timeout_secs(),
            interval_secs: default_poll_interval_secs(),
        }
    }
}

/// Describe-result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Storage backend
    #[serde(flatten)]
    pub backend: CacheBackend,

    /// Maximum age of a cached listing (in seconds) before it is refetched
    #[serde(default = "default_cache_max_age_secs")]
    pub max_age_secs: u64,
}

impl CacheConfig {
    /// Validate the cache configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let CacheBackend::File { path } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(crate::Error::config("File cache path cannot be empty"));
            }
        }
        Ok(())
    }

    /// Maximum listing age as a chrono Duration
    pub fn max_age(&self) -> chrono::Duration {
        i64::try_from(self.max_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Disabled,
            max_age_secs: default_cache_max_age_secs(),
        }
    }
}

/// Cache storage backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheBackend {
    /// No caching: every lookup lists the remote API
    #[default]
    Disabled,

    /// In-memory cache (not persistent)
    Memory,

    /// File-backed cache shared across runs
    File {
        /// Path to the cache file
        path: PathBuf,
    },
}

/// Remote API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiConfig {
    /// JSON-over-HTTP API
    Http {
        /// Base URL; methods are appended as path segments
        endpoint: String,
        /// Bearer token
        api_token: String,
        /// Request timeout (in seconds)
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
        /// Pagination rules per method name
        #[serde(default)]
        pagination: HashMap<String, PaginationSpec>,
    },

    /// Custom API
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ApiConfig {
    /// Validate the API configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ApiConfig::Http {
                endpoint,
                api_token,
                timeout_secs,
                ..
            } => {
                if endpoint.is_empty() {
                    return Err(crate::Error::config("HTTP API endpoint cannot be empty"));
                }
                if api_token.is_empty() {
                    return Err(crate::Error::config("HTTP API token cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("HTTP API timeout must be > 0"));
                }
                Ok(())
            }
            ApiConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom API factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom API config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the API type name
    pub fn type_name(&self) -> &str {
        match self {
            ApiConfig::Http { .. } => "http",
            ApiConfig::Custom { factory, .. } => factory,
        }
    }
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_retry_ceiling() -> u32 {
    1000
}

fn default_throttle_weight() -> u32 {
    1
}

fn default_failure_weight() -> u32 {
    10
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_throttling_signatures() -> Vec<String> {
    [
        "Throttling",
        "ThrottlingException",
        "TooManyRequests",
        "RequestLimitExceeded",
        "Rate exceeded",
        "SlowDown",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_permanent_signatures() -> Vec<String> {
    [
        "The security token included in the request is invalid",
        "AccessDenied",
        "An error occurred (403)",
        "DryRunOperation",
        "UnauthorizedOperation",
        "AuthFailure",
        "InvalidClientTokenId",
        "ParamValidationError",
        "InvalidParameterValueException",
        "ValidationError",
        "Conflict",
        "NotFound",
        "UnsupportedConfiguration",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_poll_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_cache_max_age_secs() -> u64 {
    300
}

fn default_http_timeout_secs() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_yields_defaults() {
        let config: EngineConfig = serde_json::from_value(json!({})).unwrap();

        assert_eq!(config.executor.retry_ceiling, 1000);
        assert_eq!(config.executor.throttle_weight, 1);
        assert_eq!(config.executor.failure_weight, 10);
        assert_eq!(config.poller.timeout(), Duration::from_secs(300));
        assert_eq!(config.poller.interval(), Duration::from_secs(5));
        assert_eq!(config.cache.backend, CacheBackend::Disabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_backend_is_tagged() {
        let config: CacheConfig =
            serde_json::from_value(json!({"type": "file", "path": "/tmp/cache.json", "max_age_secs": 60}))
                .unwrap();

        assert_eq!(
            config.backend,
            CacheBackend::File {
                path: PathBuf::from("/tmp/cache.json")
            }
        );
        assert_eq!(config.max_age(), chrono::Duration::seconds(60));
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let mut config = EngineConfig::default();
        config.executor.retry_ceiling = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_config_validation() {
        let http = ApiConfig::Http {
            endpoint: "https://api.example.com".to_string(),
            api_token: String::new(),
            timeout_secs: 30,
            pagination: HashMap::new(),
        };
        assert!(http.validate().is_err());
        assert_eq!(http.type_name(), "http");

        let custom = ApiConfig::Custom {
            factory: "scripted".to_string(),
            config: json!({"pages": 2}),
        };
        assert!(custom.validate().is_ok());
        assert_eq!(custom.type_name(), "scripted");
    }
}
