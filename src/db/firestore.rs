// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (Fitbit connection and stored credential)
//! - Time series (append-only metrics log)
//! - Sync logs (run summaries)

use crate::db::{collections, SyncStore};
use crate::error::{AppError, Result};
use crate::models::{
    Credential, FitbitMetrics, MetricsRecord, RunSummary, TimeseriesEntry, User, UserDocument,
};
use crate::time_utils::format_utc_rfc3339_micros;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Device value selecting the Fitbit integration on a user document.
const FITBIT_DEVICE: &str = "fitbit";

/// Fields written when a refreshed credential is stored.
const CREDENTIAL_FIELDS: [&str; 5] = [
    "fitbitData.accessToken",
    "fitbitData.refreshToken",
    "fitbitData.tokenExpiresAt",
    "fitbitData.tokenType",
    "lastUpdated",
];

/// Fields written when a new snapshot is stored.
const SNAPSHOT_FIELDS: [&str; 3] = ["latestFitbitData", "lastDataSync", "lastUpdated"];

/// Partial user document for a credential update.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialUpdate {
    fitbit_data: Credential,
    last_updated: String,
}

/// Partial user document for a latest snapshot update.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotUpdate {
    latest_fitbit_data: FitbitMetrics,
    last_data_sync: String,
    last_updated: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// With `service_account_key` set, authenticates with that inline JSON key;
    /// otherwise uses application default credentials.
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str, service_account_key: Option<&str>) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = match service_account_key {
            Some(key) => {
                tracing::info!("Using service account key from environment");
                firestore::FirestoreDb::with_options_token_source(
                    firestore::FirestoreDbOptions::new(project_id.to_string()),
                    gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
                    gcloud_sdk::TokenSourceType::Json(key.to_string()),
                )
                .await
            }
            None => {
                tracing::info!("Using application default credentials");
                firestore::FirestoreDb::new(project_id).await
            }
        }
        .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    /// Read a single user document to check connectivity and permissions.
    pub async fn ping(&self) -> Result<()> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .limit(1)
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user document by ID.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserDocument>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create or replace a user document (used to seed tests and tooling).
    pub async fn upsert_user<T>(&self, user_id: &str, doc: &T) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    // ─── Time Series Operations ──────────────────────────────────

    /// Get all time-series entries for a user, oldest first.
    pub async fn get_timeseries_for_user(&self, user_id: &str) -> Result<Vec<TimeseriesEntry>> {
        let user_id = user_id.to_string();
        self.get_client()?
            .fluent()
            .select()
            .from(collections::FITBIT_TIMESERIES)
            .filter(move |q| q.field("userId").eq(user_id.clone()))
            .order_by([("timestamp", firestore::FirestoreQueryDirection::Ascending)])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[async_trait]
impl SyncStore for FirestoreDb {
    async fn list_fitbit_users(&self) -> Result<Vec<User>> {
        let results: Vec<firestore::FirestoreResult<UserDocument>> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| {
                q.for_all([
                    q.field("selectedDevice").eq(FITBIT_DEVICE),
                    q.field("deviceConnected").eq(true),
                ])
            })
            .obj()
            .stream_query_with_errors()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .collect()
            .await;

        // One unreadable document must not hide the other users
        let connected = results.len();
        let docs: Vec<UserDocument> = results
            .into_iter()
            .filter_map(|result| match result {
                Ok(doc) => Some(doc),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable user document");
                    None
                }
            })
            .collect();
        let users: Vec<User> = docs
            .into_iter()
            .filter(|doc| doc.fitbit_data.has_usable_token())
            .filter_map(UserDocument::into_user)
            .collect();

        tracing::info!(
            connected,
            eligible = users.len(),
            "Loaded Fitbit users from Firestore"
        );
        Ok(users)
    }

    async fn update_credential(&self, user_id: &str, credential: &Credential) -> Result<()> {
        let update = CredentialUpdate {
            fitbit_data: credential.clone(),
            last_updated: format_utc_rfc3339_micros(chrono::Utc::now()),
        };

        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(CREDENTIAL_FIELDS)
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&update)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(user_id, "Stored refreshed credential");
        Ok(())
    }

    async fn save_metrics(&self, user_id: &str, record: &MetricsRecord) -> Result<()> {
        let client = self.get_client()?;
        let entry = TimeseriesEntry::new(user_id, record);
        let doc_id = TimeseriesEntry::document_id(user_id, record.fetched_at);

        // Insert fails if the key already exists; the log is append-only.
        let _: () = client
            .fluent()
            .insert()
            .into(collections::FITBIT_TIMESERIES)
            .document_id(&doc_id)
            .object(&entry)
            .execute()
            .await
            .map_err(|e| AppError::Database(format!("Failed to append time series: {}", e)))?;

        let synced_at = format_utc_rfc3339_micros(record.fetched_at);
        let snapshot = SnapshotUpdate {
            latest_fitbit_data: record.metrics.clone(),
            last_data_sync: synced_at.clone(),
            last_updated: synced_at,
        };

        let _: () = client
            .fluent()
            .update()
            .fields(SNAPSHOT_FIELDS)
            .in_col(collections::USERS)
            .document_id(user_id)
            .object(&snapshot)
            .execute()
            .await
            .map_err(|e| AppError::Database(format!("Failed to update latest snapshot: {}", e)))?;

        tracing::debug!(user_id, doc_id = %doc_id, "Saved time series record");
        Ok(())
    }

    async fn append_run_summary(&self, summary: &RunSummary) -> Result<()> {
        let _: () = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::SYNC_LOGS)
            .generate_document_id()
            .object(summary)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
