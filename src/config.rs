//! Sync configuration loaded from environment variables.
//!
//! Everything is read once at startup. Tuning knobs have defaults; the
//! Firestore project and the proxy base URL are required.

use crate::services::retry::RetryPolicy;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Backoff base for token refresh retries.
const REFRESH_BASE_DELAY_SECS: u64 = 5;
/// Wait used when the token endpoint rate-limits without a hint.
const REFRESH_RATE_LIMIT_DEFAULT_SECS: u64 = 60;
/// Backoff base for metrics fetch retries.
const FETCH_BASE_DELAY_SECS: u64 = 10;
/// Wait used when the metrics endpoint rate-limits without a hint.
const FETCH_RATE_LIMIT_DEFAULT_SECS: u64 = 300;

/// Sync configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project holding the Firestore database
    pub gcp_project_id: String,
    /// Base URL of the Fitbit token/metrics proxy
    pub api_base_url: String,
    /// Inline service account JSON (falls back to application default credentials)
    pub service_account_key: Option<String>,
    /// Maximum number of users processed at once
    pub max_concurrency: usize,
    /// Start delay increment between consecutive users
    pub stagger: Duration,
    /// Refresh tokens that expire within this window
    pub refresh_lead_time: Duration,
    /// Attempt cap for each remote call
    pub max_attempts: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            gcp_project_id: "test-project".to_string(),
            api_base_url: "http://localhost:3001".to_string(),
            service_account_key: None,
            max_concurrency: 3,
            stagger: Duration::ZERO,
            refresh_lead_time: Duration::from_secs(3600),
            max_attempts: 3,
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let api_base_url = required("FITBIT_API_BASE_URL")?
            .trim()
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            gcp_project_id: required("GCP_PROJECT_ID")?,
            api_base_url,
            service_account_key: env::var("FIREBASE_SERVICE_ACCOUNT_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            max_concurrency: parse_or("SYNC_MAX_CONCURRENCY", 3usize)?.max(1),
            stagger: Duration::from_secs(parse_or("SYNC_STAGGER_SECS", 2u64)?),
            refresh_lead_time: Duration::from_secs(parse_or("TOKEN_REFRESH_LEAD_SECS", 3600u64)?),
            max_attempts: parse_or("HTTP_MAX_ATTEMPTS", 3u32)?.max(1),
            connect_timeout: Duration::from_secs(parse_or("HTTP_CONNECT_TIMEOUT_SECS", 30u64)?),
            request_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 60u64)?),
        })
    }

    /// Retry policy for the token refresh endpoint.
    pub fn refresh_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(REFRESH_BASE_DELAY_SECS),
            default_rate_limit_delay: Duration::from_secs(REFRESH_RATE_LIMIT_DEFAULT_SECS),
        }
    }

    /// Retry policy for the metrics endpoint.
    pub fn fetch_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(FETCH_BASE_DELAY_SECS),
            default_rate_limit_delay: Duration::from_secs(FETCH_RATE_LIMIT_DEFAULT_SECS),
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw.clone(),
        }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}
