// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the sync.

pub mod metrics;
pub mod sync_log;
pub mod user;

pub use metrics::{DeviceSyncStatus, FitbitMetrics, MetricsRecord, MetricsSummary, TimeseriesEntry};
pub use sync_log::{Outcome, RunSummary, UserResult};
pub use user::{Credential, User, UserDocument};

use serde::{Deserialize, Deserializer};

/// Deserialize an explicit `null` as `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
