//! User and credential models.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::models::null_as_default;
use crate::time_utils::format_utc_rfc3339;

/// Fitbit OAuth credential, stored as `fitbitData` on the user document.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Credential {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiry as stored (RFC 3339). Kept raw so an unparsable
    /// value can be treated as expired.
    #[serde(
        rename = "tokenExpiresAt",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_expiry"
    )]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Authorization code still waiting to be exchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_code: Option<String>,
}

impl Credential {
    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.access_token)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        non_empty(&self.refresh_token)
    }

    /// Whether the user holds an access token or a pending authorization code.
    pub fn has_usable_token(&self) -> bool {
        self.access_token().is_some() || non_empty(&self.auth_code).is_some()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Read a stored expiry of any shape.
///
/// Strings are kept as-is and epoch numbers (seconds or milliseconds) are
/// converted. Anything else reads as `None`, which the credential clock
/// treats as expired.
fn lenient_expiry<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StoredExpiry {
        Text(String),
        Epoch(f64),
        Other(serde::de::IgnoredAny),
    }

    Ok(match StoredExpiry::deserialize(deserializer)? {
        StoredExpiry::Text(raw) => Some(raw),
        StoredExpiry::Epoch(value) => epoch_to_rfc3339(value),
        StoredExpiry::Other(_) => None,
    })
}

fn epoch_to_rfc3339(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    // Anything past the year 5138 in seconds is really milliseconds
    let millis = if value.abs() > 1e11 { value } else { value * 1000.0 };
    chrono::DateTime::from_timestamp_millis(millis as i64).map(format_utc_rfc3339)
}

// Tokens must never reach the logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = |v: &Option<String>| if v.is_some() { "<redacted>" } else { "<none>" };
        f.debug_struct("Credential")
            .field("access_token", &mark(&self.access_token))
            .field("refresh_token", &mark(&self.refresh_token))
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("auth_code", &mark(&self.auth_code))
            .finish()
    }
}

/// A user with a connected Fitbit, as loaded at the start of a run.
#[derive(Debug, Clone)]
pub struct User {
    /// Firestore document ID
    pub id: String,
    pub email: Option<String>,
    pub credential: Credential,
    /// Last successful data sync (ISO 8601)
    pub last_sync_at: Option<String>,
}

impl User {
    /// Name used in log lines.
    pub fn display_name(&self) -> &str {
        self.email.as_deref().unwrap_or("unknown")
    }
}

/// User document as stored in the `users` collection.
///
/// Only the fields the sync reads are mapped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserDocument {
    #[serde(alias = "_firestore_id", skip_serializing)]
    pub id: Option<String>,
    pub email: Option<String>,
    pub selected_device: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub device_connected: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub fitbit_data: Credential,
    pub last_data_sync: Option<String>,
}

impl UserDocument {
    /// Convert to a `User`. Returns `None` when the document ID is missing.
    pub fn into_user(self) -> Option<User> {
        Some(User {
            id: self.id?,
            email: self.email,
            credential: self.fitbit_data,
            last_sync_at: self.last_data_sync,
        })
    }
}
