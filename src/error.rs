// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for the sync pipeline.
//!
//! `AppError` covers bootstrap and store failures. The remote client has its
//! own typed errors (`RefreshError`, `FetchError`) so the user processor can
//! branch on them without string matching.

use crate::config::ConfigError;
use std::time::Duration;

/// Store and bootstrap errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias for store and bootstrap operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Failure of a token refresh call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// The refresh token was rejected; the credential is dead.
    #[error("Refresh token rejected")]
    InvalidToken,

    #[error("Rate limited by token endpoint")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Token endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Token refresh request failed: {0}")]
    Transport(String),

    #[error("Failed to parse token response: {0}")]
    Decode(String),
}

/// Failure of a metrics fetch call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The access token was rejected; a refresh may fix it.
    #[error("Access token expired")]
    TokenExpired,

    #[error("Rate limited by metrics endpoint")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Metrics endpoint returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Metrics request failed: {0}")]
    Transport(String),

    #[error("Failed to parse metrics response: {0}")]
    Decode(String),
}

/// Coarse classification of remote failures, used for logging and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    AuthRefreshInvalid,
    AuthRefreshTransient,
    RateLimited,
    FetchTransient,
    FetchTokenExpired,
    /// A malformed success body. Not retried.
    Malformed,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::AuthRefreshInvalid => "auth_refresh_invalid",
            ErrorClass::AuthRefreshTransient => "auth_refresh_transient",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::FetchTransient => "fetch_transient",
            ErrorClass::FetchTokenExpired => "fetch_token_expired",
            ErrorClass::Malformed => "malformed",
        }
    }
}

impl RefreshError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RefreshError::InvalidToken => ErrorClass::AuthRefreshInvalid,
            RefreshError::RateLimited { .. } => ErrorClass::RateLimited,
            RefreshError::Http { .. } | RefreshError::Transport(_) => {
                ErrorClass::AuthRefreshTransient
            }
            RefreshError::Decode(_) => ErrorClass::Malformed,
        }
    }
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::TokenExpired => ErrorClass::FetchTokenExpired,
            FetchError::RateLimited { .. } => ErrorClass::RateLimited,
            FetchError::Http { .. } | FetchError::Transport(_) => ErrorClass::FetchTransient,
            FetchError::Decode(_) => ErrorClass::Malformed,
        }
    }
}
