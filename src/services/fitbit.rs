// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitbit proxy client for token refresh and metrics fetch.
//!
//! Handles:
//! - Token refresh (`POST {base}/refresh`)
//! - Daily metrics fetch (`GET {base}/fitbit`)
//! - Retry with backoff, honouring `Retry-After` on 429
//! - Expired-token detection, including 401s wrapped by the proxy

use crate::config::Config;
use crate::error::{AppError, FetchError, RefreshError};
use crate::models::{Credential, FitbitMetrics, MetricsRecord};
use crate::services::credential_clock::expiry_from_lifetime;
use crate::services::retry::{retry_with_backoff, RetryAction, RetryPolicy};
use crate::time_utils::{format_utc_rfc3339, unique_utc_now};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// Remote operations the user processor depends on.
#[async_trait]
pub trait FitbitApi: Send + Sync {
    /// Exchange a refresh token for a new credential.
    async fn refresh_token(&self, refresh_token: &str) -> Result<Credential, RefreshError>;

    /// Fetch today's metrics with a bearer access token.
    async fn fetch_metrics(&self, access_token: &str) -> Result<MetricsRecord, FetchError>;
}

/// HTTP client for the Fitbit proxy.
#[derive(Clone)]
pub struct FitbitClient {
    http: reqwest::Client,
    base_url: String,
    refresh_policy: RetryPolicy,
    fetch_policy: RetryPolicy,
}

impl FitbitClient {
    /// Create a client from configuration.
    ///
    /// The connection pool keeps at least one idle connection per concurrent
    /// user so the concurrency bound never queues on the pool.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(config.max_concurrency.max(1))
            .build()
            .map_err(|e| AppError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            refresh_policy: config.refresh_retry_policy(),
            fetch_policy: config.fetch_retry_policy(),
        })
    }

    /// Replace the retry policies (tests use zero delays).
    pub fn with_policies(mut self, refresh_policy: RetryPolicy, fetch_policy: RetryPolicy) -> Self {
        self.refresh_policy = refresh_policy;
        self.fetch_policy = fetch_policy;
        self
    }

    async fn refresh_once(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        let response = self
            .http
            .post(format!("{}/refresh", self.base_url))
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RefreshError::InvalidToken);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RefreshError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RefreshError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: TokenRefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::Decode(e.to_string()))?;

        Ok(tokens.into_credential(refresh_token))
    }

    async fn fetch_once(&self, access_token: &str) -> Result<MetricsRecord, FetchError> {
        let response = self
            .http
            .get(format!("{}/fitbit", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::debug!("Metrics endpoint rejected access token (401)");
            return Err(FetchError::TokenExpired);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                retry_after: retry_after(&response),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_wrapped_auth_failure(&body) {
                tracing::debug!(status = %status, "Upstream rejected access token");
                return Err(FetchError::TokenExpired);
            }
            return Err(FetchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let mut metrics: FitbitMetrics = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let fetched_at = unique_utc_now();
        if metrics.date.is_empty() {
            metrics.date = fetched_at.date_naive().to_string();
        }

        Ok(MetricsRecord::new(metrics, fetched_at))
    }
}

#[async_trait]
impl FitbitApi for FitbitClient {
    async fn refresh_token(&self, refresh_token: &str) -> Result<Credential, RefreshError> {
        retry_with_backoff(
            &self.refresh_policy,
            "refresh_token",
            classify_refresh_error,
            || self.refresh_once(refresh_token),
        )
        .await
    }

    async fn fetch_metrics(&self, access_token: &str) -> Result<MetricsRecord, FetchError> {
        retry_with_backoff(
            &self.fetch_policy,
            "fetch_metrics",
            classify_fetch_error,
            || self.fetch_once(access_token),
        )
        .await
    }
}

fn classify_refresh_error(err: &RefreshError) -> RetryAction {
    match err {
        RefreshError::InvalidToken | RefreshError::Decode(_) => RetryAction::Abort,
        RefreshError::RateLimited { retry_after } => RetryAction::RateLimited(*retry_after),
        RefreshError::Http { .. } | RefreshError::Transport(_) => RetryAction::Retry,
    }
}

fn classify_fetch_error(err: &FetchError) -> RetryAction {
    match err {
        FetchError::TokenExpired | FetchError::Decode(_) => RetryAction::Abort,
        FetchError::RateLimited { retry_after } => RetryAction::RateLimited(*retry_after),
        FetchError::Http { .. } | FetchError::Transport(_) => RetryAction::Retry,
    }
}

/// Read the `Retry-After` hint from a rate-limited response.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    retry_after_from_headers(response.headers(), Utc::now())
}

/// `Retry-After` is either delay seconds or an HTTP date. A date in the past
/// means no wait.
fn retry_after_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// The proxy reports an upstream 401 as a 5xx with the status in the message.
fn is_wrapped_auth_failure(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("(401)") || lower.contains("expired_token") || lower.contains("invalid_token")
}

/// Token refresh response from the proxy.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenRefreshResponse {
    /// Build the credential to store. Keeps the old refresh token if the
    /// response did not rotate it.
    fn into_credential(self, previous_refresh_token: &str) -> Credential {
        let expires_at = expiry_from_lifetime(chrono::Utc::now(), self.expires_in);
        Credential {
            access_token: Some(self.access_token),
            refresh_token: Some(
                self.refresh_token
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| previous_refresh_token.to_string()),
            ),
            expires_at: Some(format_utc_rfc3339(expires_at)),
            token_type: Some(self.token_type.unwrap_or_else(|| "Bearer".to_string())),
            auth_code: None,
        }
    }
}
