// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitbit metrics models: the fetched snapshot and its time-series document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::null_as_default;
use crate::time_utils::{format_utc_rfc3339_micros, key_stamp};

/// Value of `dataSource` on stored records.
pub const DATA_SOURCE: &str = "fitbit_api";

/// Metrics as returned by the proxy's `/fitbit` endpoint.
///
/// Also stored verbatim as the user's `latestFitbitData` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitbitMetrics {
    /// Resting heart rate (bpm)
    #[serde(default)]
    pub heart_rate: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub steps: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub calories: f64,
    /// Total distance for the day (km)
    #[serde(default, deserialize_with = "null_as_default")]
    pub distance: f64,
    /// Fairly + very active minutes
    #[serde(default, deserialize_with = "null_as_default")]
    pub active_minutes: u32,
    #[serde(default)]
    pub sleep: Option<serde_json::Value>,
    #[serde(default)]
    pub weight: Option<f64>,
    /// Day the metrics describe (YYYY-MM-DD)
    #[serde(default, deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(default)]
    pub device_sync: Option<DeviceSyncStatus>,
}

/// Tracker sync state reported alongside the metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSyncStatus {
    pub device_type: Option<String>,
    pub battery_level: Option<i64>,
    pub last_sync_time: Option<String>,
    pub sync_age_minutes: Option<i64>,
    pub is_recent_sync: Option<bool>,
    pub device_id: Option<String>,
}

/// One successful fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub metrics: FitbitMetrics,
    /// Unique per process; see `time_utils::unique_utc_now`.
    pub fetched_at: DateTime<Utc>,
}

impl MetricsRecord {
    pub fn new(metrics: FitbitMetrics, fetched_at: DateTime<Utc>) -> Self {
        Self {
            metrics,
            fetched_at,
        }
    }

    pub fn source_date(&self) -> &str {
        &self.metrics.date
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            steps: self.metrics.steps,
            calories: self.metrics.calories,
            heart_rate: self.metrics.heart_rate,
        }
    }
}

/// Short form of a record, kept in the run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub steps: u64,
    pub calories: f64,
    pub heart_rate: Option<f64>,
}

/// Activity counters nested under `metrics` in a time-series document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMetrics {
    pub heart_rate: Option<f64>,
    pub steps: u64,
    pub calories: f64,
    pub distance: f64,
    pub active_minutes: u32,
}

/// Document in the `fitbit_timeseries` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesEntry {
    pub user_id: String,
    /// Fetch time, microsecond precision (ISO 8601)
    pub timestamp: String,
    pub date: String,
    pub metrics: ActivityMetrics,
    pub sleep: Option<serde_json::Value>,
    pub weight: Option<f64>,
    pub device_sync: Option<DeviceSyncStatus>,
    pub data_source: String,
    pub created_at: String,
}

impl TimeseriesEntry {
    pub fn new(user_id: &str, record: &MetricsRecord) -> Self {
        let m = &record.metrics;
        let stamp = format_utc_rfc3339_micros(record.fetched_at);
        Self {
            user_id: user_id.to_string(),
            timestamp: stamp.clone(),
            date: m.date.clone(),
            metrics: ActivityMetrics {
                heart_rate: m.heart_rate,
                steps: m.steps,
                calories: m.calories,
                distance: m.distance,
                active_minutes: m.active_minutes,
            },
            sleep: m.sleep.clone(),
            weight: m.weight,
            device_sync: m.device_sync.clone(),
            data_source: DATA_SOURCE.to_string(),
            created_at: stamp,
        }
    }

    /// Document ID: `{user_id}_{YYYYMMDD_HHMMSS_ffffff}`.
    pub fn document_id(user_id: &str, fetched_at: DateTime<Utc>) -> String {
        format!("{}_{}", urlencoding::encode(user_id), key_stamp(fetched_at))
    }
}
