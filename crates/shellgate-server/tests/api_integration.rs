// ABOUTME: Integration tests for the shellgate-server HTTP endpoints
// ABOUTME: Drives the axum router with /bin/sh handlers covering streaming, status mapping, and stats
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use shellgate_server::config::ServiceConfig;
use shellgate_server::router;
use shellgate_server::state::{ServerState, SharedState};

/// Service file with one `/bin/sh` endpoint per behaviour under test
fn service_toml(working_dir: &std::path::Path) -> String {
    format!(
        r#"
[service]
app_name = "testsvc"
version = "2.0.1"

[[endpoint]]
name = "echo"
handler = "/bin/sh"
args = ["-c", "printf '%s|' \"$@\"", "echo"]

[[endpoint]]
name = "strict"
handler = "/bin/sh"
args = ["-c", "printf ok", "strict"]
allowed_params = ["sta"]

[[endpoint]]
name = "upload"
handler = "/bin/sh"
args = ["-c", "cat", "upload"]

[[endpoint]]
name = "nodata"
handler = "/bin/sh"
args = ["-c", "exit 2", "nodata"]

[[endpoint]]
name = "badreq"
handler = "/bin/sh"
args = ["-c", "echo 'station code is invalid' >&2; exit 3", "badreq"]

[[endpoint]]
name = "crash"
handler = "/bin/sh"
args = ["-c", "exit 42", "crash"]

[[endpoint]]
name = "bundle"
handler = "/bin/sh"
args = ["-c", "d=\"$2\"; printf hi > \"$d/one.txt\"; echo \"$d/one.txt\"", "bundle"]
output = "zip"
working_dir = "{dir}"

[[endpoint]]
name = "where"
handler = "/bin/sh"
args = ["-c", "pwd", "where"]
handler_dir = "{dir}"
"#,
        dir = working_dir.display()
    )
}

fn test_state(working_dir: &std::path::Path) -> SharedState {
    let config = ServiceConfig::from_toml_str(&service_toml(working_dir)).expect("parse config");
    Arc::new(ServerState::new(config).expect("build state"))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

/// Send a request and collect status, headers, and body
async fn send(
    state: SharedState,
    request: Request<Body>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router::build(state)
        .oneshot(request)
        .await
        .expect("send request");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect")
        .to_bytes();
    (status, headers, bytes.to_vec())
}

// ============================================================================
// Health and Stats
// ============================================================================

#[tokio::test]
async fn health_lists_endpoints() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, _, body) = send(test_state(dir.path()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).expect("parse json");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "testsvc");
    assert_eq!(json["version"], "2.0.1");
    let endpoints = json["endpoints"].as_array().expect("endpoints array");
    assert_eq!(endpoints.len(), 8);
    assert_eq!(endpoints[0]["name"], "echo");
    assert_eq!(endpoints[6]["output"], "zip");
}

#[tokio::test]
async fn stats_count_shipped_bytes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(dir.path());

    let (status, _, body) = send(state.clone(), get("/strict/query")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");

    // The writer task records usage just after the body completes
    let mut snapshot = state.stats().snapshot();
    for _ in 0..100 {
        if snapshot.requests > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        snapshot = state.stats().snapshot();
    }
    assert_eq!(snapshot.requests, 1);
    assert_eq!(snapshot.shipped_bytes, 2);

    let (_, _, body) = send(state, get("/stats")).await;
    let json: serde_json::Value = serde_json::from_slice(&body).expect("parse json");
    assert_eq!(json["shipped_bytes"], 2);
}

// ============================================================================
// Streaming
// ============================================================================

#[tokio::test]
async fn query_params_become_handler_flags() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, headers, body) = send(
        test_state(dir.path()),
        get("/echo/query?net=IU&sta=ANMO&nodata=404"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"--net|IU|--sta|ANMO|");
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().expect("ascii");
    assert!(disposition.starts_with("inline; filename=testsvc_"));
}

#[tokio::test]
async fn post_body_reaches_handler() {
    let dir = tempfile::tempdir().expect("tempdir");
    let request = Request::builder()
        .method("POST")
        .uri("/upload/query")
        .body(Body::from("IU ANMO 00 BHZ 2024-01-01 2024-01-02\n"))
        .expect("build request");
    let (status, _, body) = send(test_state(dir.path()), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"IU ANMO 00 BHZ 2024-01-01 2024-01-02\n");
}

#[tokio::test]
async fn zip_endpoint_sends_archive_attachment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, headers, body) = send(test_state(dir.path()), get("/bundle/query")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().expect("ascii");
    assert!(disposition.starts_with("attachment; filename=testsvc_"));
    assert!(disposition.ends_with(".zip"));
    assert!(body.starts_with(b"PK\x03\x04"));
}

#[tokio::test]
async fn handler_runs_in_configured_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let expected = dir.path().canonicalize().expect("canonicalize");
    let (status, _, body) = send(test_state(dir.path()), get("/where/query")).await;
    assert_eq!(status, StatusCode::OK);
    let reported = String::from_utf8_lossy(&body).trim().to_owned();
    assert_eq!(
        std::path::Path::new(&reported).canonicalize().expect("canonicalize"),
        expected
    );
}

// ============================================================================
// Status Mapping
// ============================================================================

#[tokio::test]
async fn no_data_is_204_by_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, _, body) = send(test_state(dir.path()), get("/nodata/query")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
}

#[tokio::test]
async fn nodata_param_selects_404() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, headers, body) =
        send(test_state(dir.path()), get("/nodata/query?nodata=404")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    assert!(String::from_utf8_lossy(&body).starts_with("Error 404: "));
}

#[tokio::test]
async fn handler_bad_request_uses_stderr_message() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, _, body) = send(test_state(dir.path()), get("/badreq/query?sta=XXXXXX")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let text = String::from_utf8_lossy(&body);
    assert!(text.starts_with("Error 400: station code is invalid\n\nRequest:\n/badreq/query?sta=XXXXXX\n"));
    assert!(text.ends_with("Service version:\ntestsvc: v 2.0.1\n"));
}

#[tokio::test]
async fn unknown_exit_code_is_500_with_code() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, _, body) = send(test_state(dir.path()), get("/crash/query")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(String::from_utf8_lossy(&body).contains("42"));
}

#[tokio::test]
async fn disallowed_param_is_rejected_before_launch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = test_state(dir.path());
    let (status, _, body) = send(state.clone(), get("/strict/query?format=json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8_lossy(&body).contains("format"));
    assert_eq!(state.stats().snapshot().requests, 0);
}

#[tokio::test]
async fn unknown_endpoint_is_404() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (status, _, body) = send(test_state(dir.path()), get("/missing/query")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(String::from_utf8_lossy(&body).contains("Unknown endpoint: missing"));
}
