// ABOUTME: Per-request execution context handed to the gateway by the routing layer
// ABOUTME: Defines RequestContext, its builder methods, and the gateway defaults
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::types::OutputMode;
use crate::usage::UsageStats;

/// Default watchdog timeout (300 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default delay between `SIGTERM` and `SIGKILL` (100 milliseconds)
pub const DEFAULT_SIGKILL_DELAY_MS: u64 = 100;

/// Interval at which the status decision re-checks for output or exit
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Longest wait for a handler's stderr to close once the handler has exited
pub const STDERR_WAIT: Duration = Duration::from_millis(500);

/// Flag appended to the command line, followed by the private working directory
pub const OUTPUT_DIR_FLAG: &str = "--outputdir";

/// Per-call record describing what to run and how to stream it
///
/// Built once by the routing layer and owned by a single in-flight call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Bytes written to the handler's stdin before it is closed
    pub request_body: Option<Vec<u8>>,
    /// Maximum time without output progress before the handler is terminated
    pub timeout: Duration,
    /// Grace period between the graceful and the forced termination signal
    pub sigkill_delay: Duration,
    /// How stdout becomes the response body
    pub output_mode: OutputMode,
    /// Answer 404 instead of 204 when the handler reports no data
    pub use_404_for_204: bool,
    /// Root under which archive mode creates its private working directory
    pub working_root: Option<PathBuf>,
    /// Working directory of the handler process
    pub current_dir: Option<PathBuf>,
    /// Host environment keys passed through to the handler
    pub allowed_env_keys: Vec<String>,
    /// Extra environment variables set for the handler
    pub env: Vec<(String, String)>,
    /// Destination for shipped-byte and error counters
    pub stats: Arc<UsageStats>,
}

impl RequestContext {
    /// Create a context for the given command line with gateway defaults
    #[must_use]
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            request_body: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            sigkill_delay: Duration::from_millis(DEFAULT_SIGKILL_DELAY_MS),
            output_mode: OutputMode::Raw,
            use_404_for_204: false,
            working_root: None,
            current_dir: None,
            allowed_env_keys: default_allowed_env_keys(),
            env: Vec::new(),
            stats: Arc::new(UsageStats::default()),
        }
    }

    /// Set the request body fed to the handler's stdin
    #[must_use]
    pub fn with_request_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    /// Set the watchdog timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the grace period before a forced kill
    #[must_use]
    pub const fn with_sigkill_delay(mut self, delay: Duration) -> Self {
        self.sigkill_delay = delay;
        self
    }

    /// Set the output mode
    #[must_use]
    pub const fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Answer 404 rather than 204 for exit codes 0 and 2
    #[must_use]
    pub const fn with_use_404_for_204(mut self, enabled: bool) -> Self {
        self.use_404_for_204 = enabled;
        self
    }

    /// Set the root for archive working directories
    #[must_use]
    pub fn with_working_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.working_root = Some(root.into());
        self
    }

    /// Set the handler's working directory
    #[must_use]
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set the environment keys passed through from the host
    #[must_use]
    pub fn with_allowed_env_keys(mut self, keys: Vec<String>) -> Self {
        self.allowed_env_keys = keys;
        self
    }

    /// Add an environment variable for the handler
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Report counters into a shared stats keeper
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<UsageStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Program name, or an empty string for an empty command line
    #[must_use]
    pub fn program(&self) -> &str {
        self.command.first().map_or("", String::as_str)
    }
}

/// Default set of environment variable keys safe to pass through to handlers
#[must_use]
pub fn default_allowed_env_keys() -> Vec<String> {
    ["HOME", "PATH", "TZ", "LANG"]
        .iter()
        .map(|k| (*k).to_owned())
        .collect()
}
