// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Last timestamp handed out by `unique_utc_now`, in microseconds since the epoch.
static LAST_ISSUED_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a UTC timestamp as RFC3339 with microsecond precision.
pub fn format_utc_rfc3339_micros(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Compact sortable stamp used in document IDs (`YYYYMMDD_HHMMSS_ffffff`).
pub fn key_stamp(date: DateTime<Utc>) -> String {
    date.format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Current time, strictly increasing across calls within this process.
///
/// Two calls in the same microsecond get distinct values one microsecond
/// apart, so keys built from the result never collide within one process.
/// Two job instances running at once share no state and can still produce
/// the same value; the time-series insert then rejects the second write.
pub fn unique_utc_now() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut last = LAST_ISSUED_MICROS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last.saturating_add(1));
        match LAST_ISSUED_MICROS.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
            Err(actual) => last = actual,
        }
    }
}
