// ABOUTME: Translation of handler exit codes into response statuses
// ABOUTME: Implements the fixed handler contract table (0/2, 1, 3, 4, 137, 143, other)
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::process::ExitStatus;

use crate::types::{GatewayError, ResponseStatus};

/// Exit code of a handler killed by `SIGKILL` (128 + 9)
pub const EXIT_SIGKILL: i32 = 137;

/// Exit code of a handler killed by `SIGTERM` (128 + 15)
pub const EXIT_SIGTERM: i32 = 143;

/// Exit code as a shell reports it: the code itself, or 128 + signal number
#[must_use]
pub fn exit_code(status: &ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|sig| 128 + sig))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}

/// Map a handler exit code to the response status
///
/// Codes 0 and 2 mean "no data" and yield `Ok`; every other code is an
/// error carrying the status of the handler contract. `stderr` is the
/// handler's error-channel text and becomes part of the message.
///
/// # Errors
///
/// Returns `GatewayError` for every code other than 0 and 2.
pub fn status_for_exit_code(
    code: i32,
    use_404_for_204: bool,
    stderr: &str,
) -> Result<ResponseStatus, GatewayError> {
    let detail = stderr.trim();
    match code {
        0 | 2 => Ok(if use_404_for_204 {
            ResponseStatus::NotFound
        } else {
            ResponseStatus::NoContent
        }),
        1 => Err(GatewayError::internal(or_default(
            detail,
            "Handler reported an internal failure",
        ))),
        3 => Err(GatewayError::bad_request(or_default(
            detail,
            "Handler rejected the request",
        ))),
        4 => Err(GatewayError::payload_too_large(or_default(
            detail,
            "Request would produce too much data",
        ))),
        EXIT_SIGKILL => Err(GatewayError::internal(format!(
            "Enforced timeout or unexpected termination of handler: {detail}"
        ))),
        EXIT_SIGTERM => Err(GatewayError::internal(format!(
            "Timeout or unexpected termination of handler: {detail}"
        ))),
        other => Err(GatewayError::internal(format!(
            "Termination of handler with unknown exit code: {other} {detail}"
        ))),
    }
}

fn or_default(detail: &str, fallback: &str) -> String {
    if detail.is_empty() {
        fallback.to_owned()
    } else {
        detail.to_owned()
    }
}
