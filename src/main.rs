// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fitbit-Sync job
//!
//! Runs one sync pass over all users with a connected Fitbit device and
//! exits. Meant to be triggered by a scheduler.

use fitbit_sync::{
    config::Config,
    db::{FirestoreDb, SyncStore},
    services::{FitbitApi, FitbitClient, SyncCoordinator, SyncOptions, SyncRun},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    let config = Config::from_env().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    tracing::info!(
        project = %config.gcp_project_id,
        api_base_url = %config.api_base_url,
        "Starting Fitbit sync"
    );

    let db = FirestoreDb::new(
        &config.gcp_project_id,
        config.service_account_key.as_deref(),
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to Firestore");
        e
    })?;
    if let Err(e) = db.ping().await {
        tracing::warn!(error = %e, "Firestore ping failed; continuing");
    }

    let client = FitbitClient::new(&config)?;

    let store: Arc<dyn SyncStore> = Arc::new(db);
    let api: Arc<dyn FitbitApi> = Arc::new(client);
    let coordinator = SyncCoordinator::new(store, api, SyncOptions::from(&config));

    match coordinator.run_until(shutdown_signal()).await? {
        SyncRun::Completed(summary) => {
            tracing::info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Sync finished"
            );
        }
        SyncRun::NoUsers => tracing::info!("Nothing to sync"),
        SyncRun::Interrupted => tracing::warn!("Sync interrupted; no summary written"),
    }

    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fitbit_sync=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
