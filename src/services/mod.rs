// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - sync logic layer.

pub mod coordinator;
pub mod credential_clock;
pub mod fitbit;
pub mod processor;
pub mod retry;

pub use coordinator::{SyncCoordinator, SyncOptions, SyncRun};
pub use fitbit::{FitbitApi, FitbitClient};
pub use processor::UserProcessor;
pub use retry::{RetryAction, RetryPolicy};
