// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use fitbit_sync::db::{FirestoreDb, SyncStore};
use fitbit_sync::error::{AppError, FetchError, RefreshError, Result};
use fitbit_sync::models::{
    Credential, FitbitMetrics, MetricsRecord, RunSummary, TimeseriesEntry, User,
};
use fitbit_sync::services::FitbitApi;
use fitbit_sync::time_utils::{format_utc_rfc3339, unique_utc_now};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project", None)
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

// ─── Fixtures ────────────────────────────────────────────────────

/// Credential expiring `hours` from now (negative for already expired).
#[allow(dead_code)]
pub fn credential(access: &str, refresh: Option<&str>, hours: i64) -> Credential {
    Credential {
        access_token: Some(access.to_string()),
        refresh_token: refresh.map(str::to_string),
        expires_at: Some(format_utc_rfc3339(
            chrono::Utc::now() + chrono::Duration::hours(hours),
        )),
        token_type: Some("Bearer".to_string()),
        auth_code: None,
    }
}

#[allow(dead_code)]
pub fn user(id: &str, credential: Credential) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        credential,
        last_sync_at: None,
    }
}

/// `count` users with fresh tokens `at-0`, `at-1`, ...
#[allow(dead_code)]
pub fn fresh_users(count: usize) -> Vec<User> {
    (0..count)
        .map(|i| {
            user(
                &format!("user-{}", i),
                credential(&format!("at-{}", i), Some(&format!("rt-{}", i)), 8),
            )
        })
        .collect()
}

#[allow(dead_code)]
pub fn sample_metrics() -> FitbitMetrics {
    FitbitMetrics {
        heart_rate: Some(62.0),
        steps: 8123,
        calories: 2100.5,
        distance: 5.4,
        active_minutes: 37,
        date: "2024-06-01".to_string(),
        ..Default::default()
    }
}

// ─── In-memory store ─────────────────────────────────────────────

/// `SyncStore` backed by in-memory maps, with failure switches.
#[derive(Default)]
pub struct FakeStore {
    users: Vec<User>,
    pub fail_list: AtomicBool,
    pub fail_credentials: AtomicBool,
    pub fail_metrics: AtomicBool,
    pub fail_summary: AtomicBool,
    pub credentials: Mutex<HashMap<String, Credential>>,
    /// Time series keyed by document ID
    pub timeseries: Mutex<BTreeMap<String, TimeseriesEntry>>,
    pub latest: Mutex<HashMap<String, FitbitMetrics>>,
    pub summaries: Mutex<Vec<RunSummary>>,
}

#[allow(dead_code)]
impl FakeStore {
    pub fn with_users(users: Vec<User>) -> Self {
        Self {
            users,
            ..Default::default()
        }
    }

    pub fn timeseries_len(&self) -> usize {
        self.timeseries.lock().unwrap().len()
    }

    pub fn summaries(&self) -> Vec<RunSummary> {
        self.summaries.lock().unwrap().clone()
    }

    pub fn stored_credential(&self, user_id: &str) -> Option<Credential> {
        self.credentials.lock().unwrap().get(user_id).cloned()
    }
}

fn injected(what: &str) -> AppError {
    AppError::Database(format!("injected {} failure", what))
}

#[async_trait]
impl SyncStore for FakeStore {
    async fn list_fitbit_users(&self) -> Result<Vec<User>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(injected("list"));
        }
        Ok(self.users.clone())
    }

    async fn update_credential(&self, user_id: &str, credential: &Credential) -> Result<()> {
        if self.fail_credentials.load(Ordering::SeqCst) {
            return Err(injected("credential"));
        }
        self.credentials
            .lock()
            .unwrap()
            .insert(user_id.to_string(), credential.clone());
        Ok(())
    }

    async fn save_metrics(&self, user_id: &str, record: &MetricsRecord) -> Result<()> {
        if self.fail_metrics.load(Ordering::SeqCst) {
            return Err(injected("metrics"));
        }
        let doc_id = TimeseriesEntry::document_id(user_id, record.fetched_at);
        let mut timeseries = self.timeseries.lock().unwrap();
        if timeseries.contains_key(&doc_id) {
            return Err(AppError::Database(format!("{} already exists", doc_id)));
        }
        timeseries.insert(doc_id, TimeseriesEntry::new(user_id, record));
        self.latest
            .lock()
            .unwrap()
            .insert(user_id.to_string(), record.metrics.clone());
        Ok(())
    }

    async fn append_run_summary(&self, summary: &RunSummary) -> Result<()> {
        if self.fail_summary.load(Ordering::SeqCst) {
            return Err(injected("summary"));
        }
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }
}

// ─── Scripted remote ─────────────────────────────────────────────

/// `FitbitApi` replaying scripted responses.
///
/// Fetches are scripted per access token; once a script runs out the call
/// succeeds with `sample_metrics()`. Refreshes pop from a shared script and
/// default to issuing `refreshed-{n}` tokens.
#[derive(Default)]
pub struct FakeFitbit {
    fetch_scripts: Mutex<HashMap<String, VecDeque<std::result::Result<(), FetchError>>>>,
    refresh_script: Mutex<VecDeque<std::result::Result<(), RefreshError>>>,
    /// Panics when asked to fetch with this token
    pub panic_token: Mutex<Option<String>>,
    /// Simulated latency of each fetch
    pub fetch_delay: Mutex<Duration>,
    pub refresh_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    /// Access tokens seen by fetch, in call order
    pub fetch_tokens: Mutex<Vec<String>>,
    /// Fetch start times
    pub fetch_started: Mutex<Vec<tokio::time::Instant>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[allow(dead_code)]
impl FakeFitbit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_fetch(&self, access_token: &str, results: Vec<std::result::Result<(), FetchError>>) {
        self.fetch_scripts
            .lock()
            .unwrap()
            .insert(access_token.to_string(), results.into());
    }

    pub fn script_refresh(&self, results: Vec<std::result::Result<(), RefreshError>>) {
        *self.refresh_script.lock().unwrap() = results.into();
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub fn panic_on(&self, access_token: &str) {
        *self.panic_token.lock().unwrap() = Some(access_token.to_string());
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_tokens(&self) -> Vec<String> {
        self.fetch_tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl FitbitApi for FakeFitbit {
    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> std::result::Result<Credential, RefreshError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(Err(e)) = self.refresh_script.lock().unwrap().pop_front() {
            return Err(e);
        }
        Ok(credential(
            &format!("refreshed-{}", n),
            Some(refresh_token),
            8,
        ))
    }

    async fn fetch_metrics(
        &self,
        access_token: &str,
    ) -> std::result::Result<MetricsRecord, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());
        self.fetch_started
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());

        let explode = self.panic_token.lock().unwrap().as_deref() == Some(access_token);
        if explode {
            panic!("fake fetch exploded for {}", access_token);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .fetch_scripts
            .lock()
            .unwrap()
            .get_mut(access_token)
            .and_then(VecDeque::pop_front);
        if let Some(Err(e)) = scripted {
            return Err(e);
        }

        Ok(MetricsRecord::new(sample_metrics(), unique_utc_now()))
    }
}
