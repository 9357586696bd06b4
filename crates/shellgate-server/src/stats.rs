// ABOUTME: GET /stats handler exposing the process-wide usage counters as JSON
// ABOUTME: Reports completed requests, shipped bytes, and calls that failed before streaming
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::state::SharedState;

/// Handle GET /stats
pub async fn handle(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.stats().snapshot())
}
