// ABOUTME: TOML service file describing the service identity and its handler-backed endpoints
// ABOUTME: Deserialises [service] and [[endpoint]] tables and validates them at load time
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use shellgate::config::{DEFAULT_SIGKILL_DELAY_MS, DEFAULT_TIMEOUT_SECS};
use shellgate::{GatewayError, OutputMode};

/// Whole service file
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service identity and listener
    #[serde(default)]
    pub service: ServiceSection,
    /// Handler-backed endpoints
    #[serde(default, rename = "endpoint")]
    pub endpoints: Vec<EndpointConfig>,
}

/// `[service]` table
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Name used in error bodies, file names, and usage entries
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Version reported in error bodies and `/health`
    #[serde(default = "default_version")]
    pub version: String,
    /// Listen host
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            version: default_version(),
            host: default_host(),
            port: default_port(),
        }
    }
}

/// One `[[endpoint]]` table
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Path segment the endpoint is served under
    pub name: String,
    /// Handler program, absolute or looked up on `PATH`
    pub handler: String,
    /// Static arguments placed before request parameters
    #[serde(default)]
    pub args: Vec<String>,
    /// How handler output becomes the response body
    #[serde(default)]
    pub output: OutputMode,
    /// Content type of successful responses
    pub media_type: Option<String>,
    /// File extension for raw output downloads
    pub extension: Option<String>,
    /// Seconds without output progress before the handler is stopped
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Grace period between `SIGTERM` and `SIGKILL`
    #[serde(default = "default_sigkill_delay_ms")]
    pub sigkill_delay_ms: u64,
    /// Answer 404 instead of 204 when the handler has no data
    #[serde(default)]
    pub use_404_for_204: bool,
    /// Root for per-request archive directories (required for `zip`)
    pub working_dir: Option<PathBuf>,
    /// Working directory of the handler, also the base for a relative `handler`
    pub handler_dir: Option<PathBuf>,
    /// Host environment keys passed to the handler (core defaults when absent)
    pub allowed_env_keys: Option<Vec<String>>,
    /// Extra environment variables for the handler
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// Accepted query parameter names; empty accepts any
    #[serde(default)]
    pub allowed_params: Vec<String>,
}

/// Environment variable set for a handler
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    /// Variable name
    pub key: String,
    /// Variable value
    pub value: String,
}

impl EndpointConfig {
    /// Watchdog timeout
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Termination grace period
    pub const fn sigkill_delay(&self) -> Duration {
        Duration::from_millis(self.sigkill_delay_ms)
    }

    /// Content type of successful responses
    pub fn media_type(&self) -> &str {
        self.media_type.as_deref().unwrap_or(match self.output {
            OutputMode::Raw => "text/plain",
            OutputMode::Mseed => "application/vnd.fdsn.mseed",
            OutputMode::Zip => "application/zip",
        })
    }

    /// File extension used in `Content-Disposition`
    pub fn file_extension(&self) -> &str {
        match self.output {
            OutputMode::Mseed => "mseed",
            OutputMode::Zip => "zip",
            OutputMode::Raw => self.extension.as_deref().unwrap_or("txt"),
        }
    }

    /// Whether a query parameter may be forwarded to the handler
    pub fn accepts_param(&self, name: &str) -> bool {
        self.allowed_params.is_empty() || self.allowed_params.iter().any(|p| p == name)
    }
}

impl ServiceConfig {
    /// Read and validate a service file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate service file contents
    pub fn from_toml_str(content: &str) -> Result<Self, GatewayError> {
        let config: Self =
            toml::from_str(content).map_err(|e| GatewayError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check endpoint names and archive prerequisites
    pub fn validate(&self) -> Result<(), GatewayError> {
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.is_empty() || endpoint.name.contains('/') {
                return Err(GatewayError::config(format!(
                    "invalid endpoint name '{}'",
                    endpoint.name
                )));
            }
            if !seen.insert(endpoint.name.as_str()) {
                return Err(GatewayError::config(format!(
                    "duplicate endpoint name '{}'",
                    endpoint.name
                )));
            }
            if endpoint.output.needs_working_directory() && endpoint.working_dir.is_none() {
                return Err(GatewayError::config(format!(
                    "endpoint '{}' produces {} output and needs working_dir",
                    endpoint.name, endpoint.output
                )));
            }
            if endpoint.timeout_secs == 0 {
                return Err(GatewayError::config(format!(
                    "endpoint '{}' has a zero timeout",
                    endpoint.name
                )));
            }
        }
        Ok(())
    }

    /// Look up an endpoint by name
    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

fn default_app_name() -> String {
    "shellgate".to_owned()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

const fn default_port() -> u16 {
    8080
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_sigkill_delay_ms() -> u64 {
    DEFAULT_SIGKILL_DELAY_MS
}
