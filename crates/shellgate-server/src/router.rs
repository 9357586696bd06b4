// ABOUTME: Axum router wiring the handler endpoints, health check, and usage counters
// ABOUTME: Mounts GET/POST /{endpoint}/query, GET /health, and GET /stats
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use axum::routing::get;
use axum::Router;

use crate::health;
use crate::query;
use crate::state::SharedState;
use crate::stats;

/// Build the application router with all endpoints
///
/// Routes:
/// - `GET|POST /{endpoint}/query`: run the endpoint's handler and stream its output
/// - `GET /health`: service identity and configured endpoints
/// - `GET /stats`: shipped-bytes, request, and error counters
pub fn build(state: SharedState) -> Router {
    Router::new()
        .route("/{endpoint}/query", get(query::handle).post(query::handle))
        .route("/health", get(health::handle))
        .route("/stats", get(stats::handle))
        .with_state(state)
}
