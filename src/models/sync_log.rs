//! Per-user outcomes and the run summary written to `sync_logs`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MetricsSummary;

/// Result of processing one user in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub user_id: String,
    pub email: Option<String>,
    pub result: UserResult,
}

/// What happened to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UserResult {
    Success { summary: MetricsSummary },
    NoToken,
    RefreshFailed { reason: String },
    FetchFailed { reason: String },
    UnexpectedError { detail: String },
}

impl UserResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UserResult::Success { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            UserResult::Success { .. } => "success",
            UserResult::NoToken => "no_token",
            UserResult::RefreshFailed { .. } => "refresh_failed",
            UserResult::FetchFailed { .. } => "fetch_failed",
            UserResult::UnexpectedError { .. } => "unexpected_error",
        }
    }

    /// Human-readable failure reason (`None` on success).
    pub fn reason(&self) -> Option<&str> {
        match self {
            UserResult::Success { .. } => None,
            UserResult::NoToken => Some("No access token"),
            UserResult::RefreshFailed { reason } | UserResult::FetchFailed { reason } => {
                Some(reason)
            }
            UserResult::UnexpectedError { detail } => Some(detail),
        }
    }
}

impl Outcome {
    pub fn new(user_id: impl Into<String>, email: Option<String>, result: UserResult) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            result,
        }
    }
}

/// Summary of a full sync pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub total_users: usize,
    pub succeeded: usize,
    /// Every user that did not succeed, including `no_token`
    pub failed: usize,
    pub duration_seconds: f64,
    pub outcomes: Vec<Outcome>,
}

impl RunSummary {
    pub fn from_outcomes(
        started_at: DateTime<Utc>,
        duration_seconds: f64,
        outcomes: Vec<Outcome>,
    ) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.result.is_success()).count();
        Self {
            started_at,
            total_users: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            duration_seconds,
            outcomes,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.result.is_success())
    }
}
