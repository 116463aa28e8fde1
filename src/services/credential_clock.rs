//! Access token expiry decisions. Pure; no I/O.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Refresh tokens that expire within this window.
pub const DEFAULT_REFRESH_LEAD_TIME: Duration = Duration::from_secs(60 * 60);

/// Whether an access token with the given stored expiry should be refreshed now.
///
/// Missing or unparsable expiries count as expired. A token whose remaining
/// lifetime is exactly `lead_time` needs a refresh.
pub fn needs_refresh(expires_at: Option<&str>, now: DateTime<Utc>, lead_time: Duration) -> bool {
    let Some(expires_at) = parse_expiry(expires_at) else {
        return true;
    };

    match (expires_at - now).to_std() {
        Ok(remaining) => remaining <= lead_time,
        // Negative: already expired
        Err(_) => true,
    }
}

/// Parse a stored RFC 3339 expiry.
pub fn parse_expiry(expires_at: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = expires_at?.trim();
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Absolute expiry for a token issued at `now` that lives `expires_in_secs`.
pub fn expiry_from_lifetime(now: DateTime<Utc>, expires_in_secs: i64) -> DateTime<Utc> {
    now + chrono::Duration::seconds(expires_in_secs.max(0))
}
