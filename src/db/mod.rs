//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

use crate::error::Result;
use crate::models::{Credential, MetricsRecord, RunSummary, User};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Append-only metrics log (one document per successful fetch)
    pub const FITBIT_TIMESERIES: &str = "fitbit_timeseries";
    /// One summary per sync run
    pub const SYNC_LOGS: &str = "sync_logs";
}

/// Everything the sync needs from the document store.
///
/// Passed explicitly into the coordinator and processor so tests can swap in
/// an in-memory fake.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Users with Fitbit selected and connected that hold an access token or
    /// a pending authorization code.
    async fn list_fitbit_users(&self) -> Result<Vec<User>>;

    /// Overwrite the stored credential after a refresh.
    async fn update_credential(&self, user_id: &str, credential: &Credential) -> Result<()>;

    /// Append a time-series record and update the user's latest snapshot.
    async fn save_metrics(&self, user_id: &str, record: &MetricsRecord) -> Result<()>;

    /// Append the summary of a finished run.
    async fn append_run_summary(&self, summary: &RunSummary) -> Result<()>;
}
