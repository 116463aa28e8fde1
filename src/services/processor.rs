// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user sync workflow.
//!
//! Handles one user end to end:
//! 1. Skip users without an access token
//! 2. Refresh the token proactively if it is close to expiry
//! 3. Fetch metrics, refreshing once more if the token is rejected
//! 4. Store the record in the time series
//!
//! Every path ends in an `Outcome`; nothing is propagated to the caller.

use crate::db::SyncStore;
use crate::error::{AppError, FetchError, RefreshError, Result};
use crate::models::{Credential, MetricsRecord, Outcome, User, UserResult};
use crate::services::credential_clock::needs_refresh;
use crate::services::fitbit::FitbitApi;
use std::sync::Arc;
use std::time::Duration;

/// Runs the sync workflow for a single user.
#[derive(Clone)]
pub struct UserProcessor {
    api: Arc<dyn FitbitApi>,
    store: Arc<dyn SyncStore>,
    refresh_lead_time: Duration,
}

impl UserProcessor {
    pub fn new(
        api: Arc<dyn FitbitApi>,
        store: Arc<dyn SyncStore>,
        refresh_lead_time: Duration,
    ) -> Self {
        Self {
            api,
            store,
            refresh_lead_time,
        }
    }

    /// Process a user and report what happened.
    pub async fn process(&self, user: &User) -> Outcome {
        tracing::info!(
            user_id = %user.id,
            email = user.display_name(),
            last_sync_at = user.last_sync_at.as_deref().unwrap_or("never"),
            "Processing user"
        );

        let result = match self.run(user).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Unexpected error processing user");
                UserResult::UnexpectedError {
                    detail: e.to_string(),
                }
            }
        };

        if result.is_success() {
            tracing::info!(user_id = %user.id, "User synced");
        }

        Outcome::new(user.id.clone(), user.email.clone(), result)
    }

    async fn run(&self, user: &User) -> Result<UserResult> {
        let credential = &user.credential;

        let Some(stored_access_token) = credential.access_token() else {
            tracing::warn!(user_id = %user.id, "No access token, skipping");
            return Ok(UserResult::NoToken);
        };

        let mut access_token = stored_access_token.to_string();
        let mut refresh_token = credential.refresh_token().map(str::to_string);
        let mut refreshed = false;

        // Proactive refresh
        if needs_refresh(
            credential.expires_at.as_deref(),
            chrono::Utc::now(),
            self.refresh_lead_time,
        ) {
            match refresh_token.as_deref() {
                Some(token) => {
                    tracing::info!(user_id = %user.id, "Access token expiring, refreshing");
                    let new_credential = match self.refresh(user, token).await {
                        Ok(c) => c,
                        Err(e) => {
                            return Ok(UserResult::RefreshFailed {
                                reason: e.to_string(),
                            })
                        }
                    };
                    access_token = access_token_of(&new_credential)?;
                    refresh_token = new_credential.refresh_token;
                    refreshed = true;
                }
                None => {
                    tracing::debug!(
                        user_id = %user.id,
                        "Access token expiring but no refresh token, using stored token"
                    );
                }
            }
        }

        let record = match self.api.fetch_metrics(&access_token).await {
            Ok(record) => record,
            Err(FetchError::TokenExpired) if !refreshed => {
                match self.refresh_and_refetch(user, refresh_token.as_deref()).await? {
                    Ok(record) => record,
                    Err(reason) => return Ok(UserResult::FetchFailed { reason }),
                }
            }
            Err(e) => {
                return Ok(UserResult::FetchFailed {
                    reason: e.to_string(),
                })
            }
        };

        self.persist(user, &record).await;

        Ok(UserResult::Success {
            summary: record.summary(),
        })
    }

    /// Reactive refresh after the metrics endpoint rejected the token.
    ///
    /// Runs at most once per user per run. The inner `Err` is the failure reason.
    async fn refresh_and_refetch(
        &self,
        user: &User,
        refresh_token: Option<&str>,
    ) -> Result<std::result::Result<MetricsRecord, String>> {
        let Some(refresh_token) = refresh_token else {
            return Ok(Err(
                "Access token expired and no refresh token available".to_string(),
            ));
        };

        tracing::info!(user_id = %user.id, "Access token rejected, refreshing and retrying");

        let new_credential = match self.refresh(user, refresh_token).await {
            Ok(c) => c,
            Err(e) => return Ok(Err(format!("Token refresh failed: {}", e))),
        };

        let access_token = access_token_of(&new_credential)?;
        Ok(self
            .api
            .fetch_metrics(&access_token)
            .await
            .map_err(|e| format!("Fetch failed after token refresh: {}", e)))
    }

    /// Refresh and store the new credential. A storage failure is logged only.
    async fn refresh(
        &self,
        user: &User,
        refresh_token: &str,
    ) -> std::result::Result<Credential, RefreshError> {
        let credential = self.api.refresh_token(refresh_token).await.map_err(|e| {
            tracing::warn!(
                user_id = %user.id,
                class = e.class().as_str(),
                error = %e,
                "Token refresh failed"
            );
            e
        })?;

        if let Err(e) = self.store.update_credential(&user.id, &credential).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to store refreshed credential");
        }

        Ok(credential)
    }

    /// Store a fetched record. A storage failure is logged only.
    async fn persist(&self, user: &User, record: &MetricsRecord) {
        if let Err(e) = self.store.save_metrics(&user.id, record).await {
            tracing::warn!(
                user_id = %user.id,
                date = record.source_date(),
                error = %e,
                "Failed to save metrics"
            );
        }
    }
}

fn access_token_of(credential: &Credential) -> Result<String> {
    credential
        .access_token()
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Refreshed credential has no access token")))
}
