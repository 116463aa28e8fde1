// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Fitbit-Sync: scheduled Fitbit metrics sync for connected users
//!
//! This crate loads every user with a connected Fitbit device, keeps their
//! access tokens fresh, pulls today's metrics through the Fitbit proxy and
//! stores them in Firestore, recording a summary of each run.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;
