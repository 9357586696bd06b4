// ABOUTME: GET/POST /{endpoint}/query handler that runs the endpoint's program per request
// ABOUTME: Maps query parameters to handler flags and bridges the streamed body through a duplex pipe
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use shellgate::streaming::StreamingResponse;
use shellgate::{
    Decision, GatewayError, Invocation, OutputMode, RequestContext, ResponseStatus, UsageStats,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::config::{EndpointConfig, ServiceSection};
use crate::error::{error_response, status_code};
use crate::state::{Endpoint, SharedState};

/// Query parameter selecting the no-data status, consumed by the server
pub const NODATA_PARAM: &str = "nodata";

/// Capacity of the pipe between the handler writer and the HTTP body
const BRIDGE_BUFFER_BYTES: usize = 64 * 1024;

/// Handle GET|POST /{endpoint}/query
///
/// The status is decided before any header is sent: errors and empty
/// results get their mapped status, output gets 200 and is streamed.
pub async fn handle(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let uri = uri.to_string();
    let service = state.service();

    let Some(endpoint) = state.endpoint(&name) else {
        let err = GatewayError::new(ResponseStatus::NotFound, format!("Unknown endpoint: {name}"));
        return error_response(&err, &uri, service);
    };

    let request_body = (method == Method::POST).then(|| body.to_vec());
    let ctx = match build_context(endpoint, &params, request_body, state.stats()) {
        Ok(ctx) => ctx,
        Err(e) => return error_response(&e, &uri, service),
    };
    info!(endpoint = %name, %method, params = params.len(), "Running handler");

    match Invocation::new(ctx, state.usage()).start().await {
        Ok(Decision::Stream(response)) => stream_response(response, &endpoint.config, service),
        Ok(Decision::Empty(ResponseStatus::NotFound)) => {
            let err = GatewayError::new(ResponseStatus::NotFound, "No data matched the request");
            error_response(&err, &uri, service)
        }
        Ok(Decision::Empty(status)) => status_code(status).into_response(),
        Err(e) => error_response(&e, &uri, service),
    }
}

/// Build the handler invocation for one request
///
/// Query parameters become `--name value` pairs after the static args, in
/// request order. `nodata` is consumed here and overrides the endpoint's
/// 204/404 policy.
pub fn build_context(
    endpoint: &Endpoint,
    params: &[(String, String)],
    request_body: Option<Vec<u8>>,
    stats: Arc<UsageStats>,
) -> Result<RequestContext, GatewayError> {
    let config = &endpoint.config;
    let mut command = vec![endpoint.program.display().to_string()];
    command.extend(config.args.iter().cloned());

    let mut use_404_for_204 = config.use_404_for_204;
    for (name, value) in params {
        if name == NODATA_PARAM {
            use_404_for_204 = parse_nodata(value)?;
            continue;
        }
        if !config.accepts_param(name) {
            return Err(GatewayError::bad_request(format!(
                "Unsupported query parameter: {name}"
            )));
        }
        command.push(format!("--{name}"));
        command.push(value.clone());
    }

    let mut ctx = RequestContext::new(command)
        .with_timeout(config.timeout())
        .with_sigkill_delay(config.sigkill_delay())
        .with_output_mode(config.output)
        .with_use_404_for_204(use_404_for_204)
        .with_stats(stats);
    if let Some(root) = &config.working_dir {
        ctx = ctx.with_working_root(root);
    }
    if let Some(dir) = &config.handler_dir {
        ctx = ctx.with_current_dir(dir);
    }
    if let Some(keys) = &config.allowed_env_keys {
        ctx = ctx.with_allowed_env_keys(keys.clone());
    }
    for var in &config.env {
        ctx = ctx.with_env(&var.key, &var.value);
    }
    if let Some(body) = request_body {
        ctx = ctx.with_request_body(body);
    }
    Ok(ctx)
}

fn parse_nodata(value: &str) -> Result<bool, GatewayError> {
    match value.trim() {
        "404" => Ok(true),
        "204" => Ok(false),
        other => Err(GatewayError::bad_request(format!(
            "Invalid {NODATA_PARAM} value: {other}, must be 204 or 404"
        ))),
    }
}

fn stream_response(
    response: StreamingResponse,
    config: &EndpointConfig,
    service: &ServiceSection,
) -> Response {
    let content_type = HeaderValue::from_str(config.media_type())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&content_disposition(config, service))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let (writer, reader) = tokio::io::duplex(BRIDGE_BUFFER_BYTES);
    let endpoint = config.name.clone();
    tokio::spawn(async move {
        let report = response.write(writer).await;
        debug!(
            endpoint = %endpoint,
            bytes = report.bytes,
            failure = ?report.failure,
            "Response stream finished"
        );
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

/// `Content-Disposition` value: inline for raw output, attachment otherwise
pub fn content_disposition(config: &EndpointConfig, service: &ServiceSection) -> String {
    let kind = if config.output == OutputMode::Raw {
        "inline"
    } else {
        "attachment"
    };
    format!(
        "{kind}; filename={app}_{stamp}.{ext}",
        app = service.app_name,
        stamp = Utc::now().format("%Y-%m-%dT%H:%M:%S"),
        ext = config.file_extension(),
    )
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use crate::config::ServiceConfig;

    fn endpoint(toml: &str) -> Endpoint {
        let config = ServiceConfig::from_toml_str(toml).unwrap();
        Endpoint {
            config: config.endpoints[0].clone(),
            program: PathBuf::from("/usr/local/bin/fetch"),
        }
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn params_follow_static_args_in_order() {
        let ep = endpoint(
            r#"
[[endpoint]]
name = "data"
handler = "/usr/local/bin/fetch"
args = ["--archive", "primary"]
timeout_secs = 30
"#,
        );
        let ctx = build_context(
            &ep,
            &pairs(&[("sta", "ANMO"), ("net", "IU")]),
            None,
            Arc::new(UsageStats::default()),
        )
        .unwrap();
        assert_eq!(
            ctx.command,
            vec![
                "/usr/local/bin/fetch",
                "--archive",
                "primary",
                "--sta",
                "ANMO",
                "--net",
                "IU"
            ]
        );
        assert_eq!(ctx.timeout, Duration::from_secs(30));
        assert!(ctx.request_body.is_none());
        assert!(ctx.current_dir.is_none());
    }

    #[test]
    fn nodata_is_consumed_and_overrides_policy() {
        let ep = endpoint(
            r#"
[[endpoint]]
name = "data"
handler = "/usr/local/bin/fetch"
allowed_params = ["sta"]
"#,
        );
        let ctx = build_context(
            &ep,
            &pairs(&[("nodata", "404"), ("sta", "ANMO")]),
            Some(b"body".to_vec()),
            Arc::new(UsageStats::default()),
        )
        .unwrap();
        assert!(ctx.use_404_for_204);
        assert_eq!(ctx.command.len(), 3);
        assert_eq!(ctx.request_body.as_deref(), Some(&b"body"[..]));

        let err = build_context(
            &ep,
            &pairs(&[("nodata", "500")]),
            None,
            Arc::new(UsageStats::default()),
        )
        .unwrap_err();
        assert_eq!(err.status, ResponseStatus::BadRequest);
    }

    #[test]
    fn disallowed_param_is_rejected() {
        let ep = endpoint(
            r#"
[[endpoint]]
name = "data"
handler = "/usr/local/bin/fetch"
allowed_params = ["sta"]
"#,
        );
        let err = build_context(
            &ep,
            &pairs(&[("format", "json")]),
            None,
            Arc::new(UsageStats::default()),
        )
        .unwrap_err();
        assert_eq!(err.status, ResponseStatus::BadRequest);
        assert!(err.message.contains("format"));
    }

    #[test]
    fn disposition_depends_on_output() {
        let service = ServiceSection {
            app_name: "dataselect".to_owned(),
            ..ServiceSection::default()
        };
        let raw = endpoint(
            r#"
[[endpoint]]
name = "text"
handler = "/bin/true"
"#,
        );
        let value = content_disposition(&raw.config, &service);
        assert!(value.starts_with("inline; filename=dataselect_"));
        assert!(value.ends_with(".txt"));

        let seed = endpoint(
            r#"
[[endpoint]]
name = "data"
handler = "/bin/true"
output = "mseed"
"#,
        );
        let value = content_disposition(&seed.config, &service);
        assert!(value.starts_with("attachment; filename=dataselect_"));
        assert!(value.ends_with(".mseed"));
    }
}
