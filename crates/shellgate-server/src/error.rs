// ABOUTME: Plain-text error bodies in the FDSN web service layout
// ABOUTME: Maps gateway statuses to HTTP status codes and renders request and version details
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use shellgate::{GatewayError, ResponseStatus};
use tracing::debug;

use crate::config::ServiceSection;

/// HTTP status for a gateway status
pub const fn status_code(status: ResponseStatus) -> StatusCode {
    match status {
        ResponseStatus::Ok => StatusCode::OK,
        ResponseStatus::NoContent => StatusCode::NO_CONTENT,
        ResponseStatus::BadRequest => StatusCode::BAD_REQUEST,
        ResponseStatus::NotFound => StatusCode::NOT_FOUND,
        ResponseStatus::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ResponseStatus::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render the error body text
pub fn error_body(err: &GatewayError, uri: &str, service: &ServiceSection) -> String {
    let submitted = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f");
    format!(
        "Error {code}: {message}\n\nRequest:\n{uri}\n\nRequest Submitted:\n{submitted}\n\nService version:\n{app}: v {version}\n",
        code = err.status.code(),
        message = err.message,
        app = service.app_name,
        version = service.version,
    )
}

/// Build a `text/plain` error response
pub fn error_response(err: &GatewayError, uri: &str, service: &ServiceSection) -> Response {
    debug!(status = err.status.code(), message = %err.message, "Sending error response");
    (
        status_code(err.status),
        [(header::CONTENT_TYPE, "text/plain")],
        error_body(err, uri, service),
    )
        .into_response()
}
