// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync pass tests: scheduling, isolation, summaries, and shutdown.

use fitbit_sync::error::FetchError;
use fitbit_sync::models::{Credential, UserResult};
use fitbit_sync::services::{SyncCoordinator, SyncOptions, SyncRun};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{fresh_users, user, FakeFitbit, FakeStore};

fn options(max_concurrency: usize, stagger: Duration) -> SyncOptions {
    SyncOptions {
        max_concurrency,
        stagger,
        refresh_lead_time: Duration::from_secs(3600),
    }
}

fn coordinator(
    store: &Arc<FakeStore>,
    api: &Arc<FakeFitbit>,
    options: SyncOptions,
) -> SyncCoordinator {
    SyncCoordinator::new(store.clone(), api.clone(), options)
}

fn expect_summary(run: SyncRun) -> fitbit_sync::models::RunSummary {
    match run {
        SyncRun::Completed(summary) => summary,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_all_users_synced() {
    let store = Arc::new(FakeStore::with_users(fresh_users(5)));
    let api = Arc::new(FakeFitbit::new());

    let summary = expect_summary(
        coordinator(&store, &api, options(3, Duration::ZERO))
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.total_users, 5);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.outcomes.len(), 5);
    assert_eq!(store.timeseries_len(), 5);
    assert_eq!(store.summaries(), vec![summary]);
}

#[tokio::test]
async fn test_no_users_writes_nothing() {
    let store = Arc::new(FakeStore::default());
    let api = Arc::new(FakeFitbit::new());

    let run = coordinator(&store, &api, options(3, Duration::ZERO))
        .run()
        .await
        .unwrap();

    assert_eq!(run, SyncRun::NoUsers);
    assert!(store.summaries().is_empty());
    assert_eq!(api.fetch_calls(), 0);
}

#[tokio::test]
async fn test_user_load_failure_is_fatal() {
    let store = Arc::new(FakeStore::with_users(fresh_users(2)));
    store.fail_list.store(true, Ordering::SeqCst);
    let api = Arc::new(FakeFitbit::new());

    let result = coordinator(&store, &api, options(3, Duration::ZERO))
        .run()
        .await;

    assert!(result.is_err());
    assert!(store.summaries().is_empty());
    assert_eq!(api.fetch_calls(), 0);
}

#[tokio::test]
async fn test_failures_are_counted_per_user() {
    let mut users = fresh_users(3);
    users.push(user("no-token", Credential::default()));
    let store = Arc::new(FakeStore::with_users(users));
    let api = Arc::new(FakeFitbit::new());
    api.script_fetch("at-1", vec![Err(FetchError::Transport("reset".to_string()))]);

    let summary = expect_summary(
        coordinator(&store, &api, options(2, Duration::ZERO))
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.total_users, 4);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);

    let mut failed: Vec<(&str, &str)> = summary
        .failures()
        .map(|o| (o.user_id.as_str(), o.result.status()))
        .collect();
    failed.sort();
    assert_eq!(
        failed,
        vec![("no-token", "no_token"), ("user-1", "fetch_failed")]
    );
}

#[tokio::test]
async fn test_panicking_user_is_isolated() {
    let store = Arc::new(FakeStore::with_users(fresh_users(4)));
    let api = Arc::new(FakeFitbit::new());
    api.panic_on("at-2");

    let summary = expect_summary(
        coordinator(&store, &api, options(2, Duration::ZERO))
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.total_users, 4);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 1);

    let failure = summary.failures().next().unwrap();
    assert_eq!(failure.user_id, "user-2");
    assert_eq!(failure.email.as_deref(), Some("user-2@example.com"));
    match &failure.result {
        UserResult::UnexpectedError { detail } => {
            assert!(detail.contains("fake fetch exploded"), "{}", detail)
        }
        other => panic!("expected unexpected_error, got {:?}", other),
    }
    assert_eq!(store.timeseries_len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let store = Arc::new(FakeStore::with_users(fresh_users(10)));
    let api = Arc::new(FakeFitbit::new());
    api.set_fetch_delay(Duration::from_secs(1));

    let summary = expect_summary(
        coordinator(&store, &api, options(3, Duration::ZERO))
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.succeeded, 10);
    assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_starts_are_staggered() {
    let store = Arc::new(FakeStore::with_users(fresh_users(4)));
    let api = Arc::new(FakeFitbit::new());
    let start = tokio::time::Instant::now();

    expect_summary(
        coordinator(&store, &api, options(10, Duration::from_secs(2)))
            .run()
            .await
            .unwrap(),
    );

    let mut offsets: Vec<Duration> = api
        .fetch_started
        .lock()
        .unwrap()
        .iter()
        .map(|t| t.duration_since(start))
        .collect();
    offsets.sort();
    assert_eq!(
        offsets,
        vec![
            Duration::ZERO,
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(6),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_abandons_run_without_persisting() {
    let store = Arc::new(FakeStore::with_users(fresh_users(3)));
    let api = Arc::new(FakeFitbit::new());
    api.set_fetch_delay(Duration::from_secs(30));

    let run = coordinator(&store, &api, options(3, Duration::ZERO))
        .run_until(tokio::time::sleep(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(run, SyncRun::Interrupted);
    assert!(store.summaries().is_empty());
    assert_eq!(store.timeseries_len(), 0);

    // Aborted tasks never reach the store
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(store.timeseries_len(), 0);
}

#[tokio::test]
async fn test_summary_write_failure_is_swallowed() {
    let store = Arc::new(FakeStore::with_users(fresh_users(2)));
    store.fail_summary.store(true, Ordering::SeqCst);
    let api = Arc::new(FakeFitbit::new());

    let summary = expect_summary(
        coordinator(&store, &api, options(3, Duration::ZERO))
            .run()
            .await
            .unwrap(),
    );

    assert_eq!(summary.succeeded, 2);
    assert!(store.summaries().is_empty());
    assert_eq!(store.timeseries_len(), 2);
}

#[tokio::test]
async fn test_repeated_runs_append_distinct_records() {
    let store = Arc::new(FakeStore::with_users(fresh_users(3)));
    let api = Arc::new(FakeFitbit::new());
    let sync = coordinator(&store, &api, options(3, Duration::ZERO));

    expect_summary(sync.run().await.unwrap());
    let latest_after_first = store.latest.lock().unwrap().clone();
    expect_summary(sync.run().await.unwrap());

    // Every fetch gets its own key; nothing is overwritten
    assert_eq!(store.timeseries_len(), 6);
    assert_eq!(*store.latest.lock().unwrap(), latest_after_first);
    assert_eq!(store.summaries().len(), 2);
}
