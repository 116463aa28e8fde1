// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync coordinator: runs one sync pass over all connected users.
//!
//! Users are processed concurrently behind a semaphore, optionally with a
//! staggered start, and each user's outcome is collected into a
//! `RunSummary` that is appended to the run log.

use crate::config::Config;
use crate::db::SyncStore;
use crate::error::Result;
use crate::models::{Outcome, RunSummary, User, UserResult};
use crate::services::fitbit::FitbitApi;
use crate::services::processor::UserProcessor;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Scheduling knobs for a sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Maximum number of users processed at once
    pub max_concurrency: usize,
    /// User `i` waits `i * stagger` before queueing for a slot
    pub stagger: Duration,
    pub refresh_lead_time: Duration,
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            stagger: config.stagger,
            refresh_lead_time: config.refresh_lead_time,
        }
    }
}

/// How a sync pass ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRun {
    Completed(RunSummary),
    /// No eligible users; nothing was done.
    NoUsers,
    /// Shutdown was requested; in-flight work was abandoned and no summary written.
    Interrupted,
}

/// Runs sync passes.
pub struct SyncCoordinator {
    store: Arc<dyn SyncStore>,
    processor: UserProcessor,
    options: SyncOptions,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn SyncStore>, api: Arc<dyn FitbitApi>, options: SyncOptions) -> Self {
        let processor = UserProcessor::new(api, store.clone(), options.refresh_lead_time);
        Self {
            store,
            processor,
            options,
        }
    }

    /// Run one full sync pass.
    pub async fn run(&self) -> Result<SyncRun> {
        self.run_until(std::future::pending()).await
    }

    /// Run one full sync pass, abandoning it if `shutdown` completes first.
    ///
    /// Only a failure to load the user set is returned as an error; per-user
    /// failures end up in the summary.
    pub async fn run_until<S>(&self, shutdown: S) -> Result<SyncRun>
    where
        S: Future<Output = ()>,
    {
        let started_at = chrono::Utc::now();
        let clock = Instant::now();

        tracing::info!("Starting Fitbit data sync for all users");

        let users = self.store.list_fitbit_users().await?;
        if users.is_empty() {
            tracing::warn!("No Fitbit users found");
            return Ok(SyncRun::NoUsers);
        }

        tracing::info!(
            users = users.len(),
            max_concurrency = self.options.max_concurrency,
            stagger_secs = self.options.stagger.as_secs(),
            "Dispatching users"
        );

        let outcomes = tokio::select! {
            outcomes = self.process_all(users) => outcomes,
            _ = shutdown => {
                tracing::warn!("Shutdown requested, abandoning in-flight users");
                return Ok(SyncRun::Interrupted);
            }
        };

        let summary =
            RunSummary::from_outcomes(started_at, clock.elapsed().as_secs_f64(), outcomes);

        tracing::info!(
            total = summary.total_users,
            succeeded = summary.succeeded,
            failed = summary.failed,
            duration_secs = summary.duration_seconds,
            "Sync completed"
        );
        for outcome in summary.failures() {
            tracing::warn!(
                user_id = %outcome.user_id,
                email = outcome.email.as_deref().unwrap_or("unknown"),
                status = outcome.result.status(),
                reason = outcome.result.reason().unwrap_or_default(),
                "User sync failed"
            );
        }

        match self.store.append_run_summary(&summary).await {
            Ok(()) => tracing::info!("Sync summary saved"),
            Err(e) => tracing::error!(error = %e, "Failed to save sync summary"),
        }

        Ok(SyncRun::Completed(summary))
    }

    /// Process every user and collect one outcome each.
    ///
    /// Dropping the returned future aborts all user tasks.
    async fn process_all(&self, users: Vec<User>) -> Vec<Outcome> {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut identities = HashMap::with_capacity(users.len());

        for (index, user) in users.into_iter().enumerate() {
            let processor = self.processor.clone();
            let semaphore = Arc::clone(&semaphore);
            let start_delay = self
                .options
                .stagger
                .saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
            let identity = (user.id.clone(), user.email.clone());

            let handle = tasks.spawn(async move {
                if !start_delay.is_zero() {
                    tokio::time::sleep(start_delay).await;
                }

                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Outcome::new(
                            user.id,
                            user.email,
                            UserResult::UnexpectedError {
                                detail: "Semaphore closed unexpectedly".to_string(),
                            },
                        )
                    }
                };

                processor.process(&user).await
            });
            identities.insert(handle.id(), identity);
        }

        let mut outcomes = Vec::with_capacity(identities.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, outcome)) => outcomes.push(outcome),
                Err(err) => {
                    let (user_id, email) = identities
                        .remove(&err.id())
                        .unwrap_or_else(|| ("unknown".to_string(), None));
                    let detail = join_error_detail(err);
                    tracing::error!(user_id = %user_id, detail = %detail, "User task failed");
                    outcomes.push(Outcome::new(
                        user_id,
                        email,
                        UserResult::UnexpectedError { detail },
                    ));
                }
            }
        }

        outcomes
    }
}

/// Describe a task that panicked or was cancelled.
fn join_error_detail(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic".to_string()
    }
}
