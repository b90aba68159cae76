//! Configuration management for the rate limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{AdmissionError, Result};

/// Main configuration for a [`RateLimiter`](crate::ratelimit::RateLimiter).
///
/// Limits are normally passed per call; these values are the defaults used by the
/// shorthand operations plus the janitor's eviction interval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Token bucket defaults
    #[serde(default)]
    pub token_bucket: TokenBucketConfig,

    /// Sliding window defaults
    #[serde(default)]
    pub sliding_window: SlidingWindowConfig,

    /// Idle-state eviction configuration
    #[serde(default)]
    pub janitor: JanitorConfig,
}

/// Default token bucket parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens a bucket holds
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Tokens added per second
    #[serde(default = "default_refill_rate")]
    pub refill_rate: u32,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
        }
    }
}

fn default_capacity() -> u32 {
    100
}

fn default_refill_rate() -> u32 {
    10
}

/// Default sliding window parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Window length in seconds
    #[serde(default = "default_window_size")]
    pub window_size_secs: u32,

    /// Admissions allowed per window
    #[serde(default = "default_window_limit")]
    pub limit: u32,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window_size_secs: default_window_size(),
            limit: default_window_limit(),
        }
    }
}

fn default_window_size() -> u32 {
    60
}

fn default_window_limit() -> u32 {
    1000
}

/// Janitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Minimum time between sweeps, and the idle age past which state is evicted
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_ms: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: default_cleanup_interval(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    5 * 60 * 1000
}

impl LimiterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string. Missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LimiterConfig = serde_yaml::from_str(yaml)
            .map_err(|e| AdmissionError::Config(format!("Failed to parse limiter config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter would treat as invalid input on every call.
    pub fn validate(&self) -> Result<()> {
        if self.token_bucket.capacity == 0 {
            return Err(AdmissionError::Config("token_bucket.capacity must be > 0".into()));
        }
        if self.token_bucket.refill_rate == 0 {
            return Err(AdmissionError::Config("token_bucket.refill_rate must be > 0".into()));
        }
        if self.sliding_window.window_size_secs == 0 {
            return Err(AdmissionError::Config(
                "sliding_window.window_size_secs must be > 0".into(),
            ));
        }
        if self.sliding_window.limit == 0 {
            return Err(AdmissionError::Config("sliding_window.limit must be > 0".into()));
        }
        if self.janitor.cleanup_interval_ms == 0 {
            return Err(AdmissionError::Config("janitor.cleanup_interval_ms must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LimiterConfig::default();
        assert_eq!(config.token_bucket.capacity, 100);
        assert_eq!(config.token_bucket.refill_rate, 10);
        assert_eq!(config.sliding_window.window_size_secs, 60);
        assert_eq!(config.sliding_window.limit, 1000);
        assert_eq!(config.janitor.cleanup_interval_ms, 300_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
token_bucket:
  capacity: 5
sliding_window:
  limit: 3
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.token_bucket.capacity, 5);
        assert_eq!(config.token_bucket.refill_rate, 10);
        assert_eq!(config.sliding_window.window_size_secs, 60);
        assert_eq!(config.sliding_window.limit, 3);
        assert_eq!(config.janitor, JanitorConfig::default());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = LimiterConfig::from_yaml("{}").unwrap();
        assert_eq!(config, LimiterConfig::default());
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = LimiterConfig::from_yaml("token_bucket:\n  refill_rate: 0\n").unwrap_err();
        assert!(matches!(err, AdmissionError::Config(_)));

        let err = LimiterConfig::from_yaml("janitor:\n  cleanup_interval_ms: 0\n").unwrap_err();
        assert!(matches!(err, AdmissionError::Config(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = LimiterConfig::from_yaml("token_bucket: [1, 2").unwrap_err();
        assert!(err.to_string().starts_with("Configuration error"));
    }

    #[test]
    fn test_missing_file() {
        let err = LimiterConfig::from_file("/nonexistent/admission.yaml").unwrap_err();
        assert!(matches!(err, AdmissionError::Io(_)));
    }
}
