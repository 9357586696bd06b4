// ABOUTME: GET /health handler reporting service identity and configured endpoints
// ABOUTME: Always answers 200 once the server is up, since handlers are resolved at startup
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::SharedState;

/// Health response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok`
    pub status: &'static str,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Configured endpoints
    pub endpoints: Vec<EndpointSummary>,
}

/// One configured endpoint
#[derive(Debug, Serialize)]
pub struct EndpointSummary {
    /// Endpoint name
    pub name: String,
    /// Output mode
    pub output: String,
    /// Content type of successful responses
    pub media_type: String,
}

/// Handle GET /health
pub async fn handle(State(state): State<SharedState>) -> impl IntoResponse {
    let service = state.service();
    let endpoints = state
        .endpoints()
        .iter()
        .map(|e| EndpointSummary {
            name: e.config.name.clone(),
            output: e.config.output.to_string(),
            media_type: e.config.media_type().to_owned(),
        })
        .collect();

    Json(HealthResponse {
        status: "ok",
        service: service.app_name.clone(),
        version: service.version.clone(),
        endpoints,
    })
}
