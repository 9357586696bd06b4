// ABOUTME: Core types for the process gateway: response statuses, output modes, and errors
// ABOUTME: Provides GatewayError, ResponseStatus, and OutputMode shared by every stage of a call
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Core Types
//!
//! Self-contained type definitions shared by the orchestrator, the writers,
//! and the hosting layer. Nothing here depends on an HTTP framework: the
//! host converts [`ResponseStatus`] into its own status type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// Response Status
// ============================================================================

/// Response statuses the gateway can decide on before headers are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseStatus {
    /// 200, output is available and will be streamed
    Ok,
    /// 204, handler succeeded with no payload
    NoContent,
    /// 400, handler rejected the request
    BadRequest,
    /// 404, handler succeeded with no payload and the 404 policy is enabled
    NotFound,
    /// 413, handler refused because the result would be too large
    PayloadTooLarge,
    /// 500, handler failure, launch failure, timeout, or unknown exit code
    InternalServerError,
}

impl ResponseStatus {
    /// Numeric HTTP status code
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::NoContent => 204,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::PayloadTooLarge => 413,
            Self::InternalServerError => 500,
        }
    }

    /// Canonical reason phrase
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NoContent => "No Content",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::PayloadTooLarge => "Request Entity Too Large",
            Self::InternalServerError => "Internal Server Error",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

// ============================================================================
// Output Mode
// ============================================================================

/// How the handler's output channel is turned into the response body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Bytes are forwarded untouched
    #[default]
    Raw,
    /// Bytes are forwarded untouched while miniSEED records are logged per channel
    #[serde(alias = "miniseed", alias = "binary")]
    Mseed,
    /// Output lines name files that are packaged into a zip archive
    Zip,
}

impl OutputMode {
    /// Whether this mode needs a private working directory
    #[must_use]
    pub const fn needs_working_directory(self) -> bool {
        matches!(self, Self::Zip)
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw => write!(f, "raw"),
            Self::Mseed => write!(f, "mseed"),
            Self::Zip => write!(f, "zip"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" | "text" => Ok(Self::Raw),
            "mseed" | "miniseed" | "binary" => Ok(Self::Mseed),
            "zip" => Ok(Self::Zip),
            other => Err(GatewayError::config(format!("Unknown output mode: {other}"))),
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

/// Error produced before the first byte of a response is sent
///
/// Carries the status the host must answer with. Once streaming has started
/// failures are absorbed and reported through the usage log instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    /// Status the host should respond with
    pub status: ResponseStatus,
    /// Human-readable error message
    pub message: String,
}

impl GatewayError {
    /// Create an error with an explicit status
    pub fn new(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ResponseStatus::InternalServerError, message)
    }

    /// Create a launch failure (executable missing, spawn refused)
    pub fn launch(program: &str, cause: impl fmt::Display) -> Self {
        Self::internal(format!("IO Error starting service process {program}: {cause}"))
    }

    /// Create a request body write failure
    pub fn input_write(cause: impl fmt::Display) -> Self {
        Self::internal(format!("Failure writing POST body: {cause}"))
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ResponseStatus::BadRequest, message)
    }

    /// Create a payload too large error
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ResponseStatus::PayloadTooLarge, message)
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::internal(format!("Service configuration problem: {}", message.into()))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for GatewayError {}
