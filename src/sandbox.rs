// ABOUTME: Environment sandboxing for handler subprocesses
// ABOUTME: Clears environment, whitelists keys, injects per-endpoint variables, sets working directory
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::env;
use std::path::PathBuf;

use tokio::process::Command;
use tracing::debug;

use crate::config::{default_allowed_env_keys, RequestContext};

/// Policy controlling the handler's execution environment
#[derive(Debug, Clone, Default)]
pub struct SandboxPolicy {
    /// Environment variable keys to pass through from the host
    pub allowed_env_keys: Vec<String>,
    /// Variables set explicitly for the handler, applied after the pass-through keys
    pub extra_env: Vec<(String, String)>,
    /// Working directory for the handler, inherited when unset
    pub working_directory: Option<PathBuf>,
}

impl SandboxPolicy {
    /// Create a policy with the default pass-through keys
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed_env_keys: default_allowed_env_keys(),
            ..Self::default()
        }
    }

    /// Build the policy described by a request context
    #[must_use]
    pub fn from_context(ctx: &RequestContext) -> Self {
        Self {
            allowed_env_keys: ctx.allowed_env_keys.clone(),
            extra_env: ctx.env.clone(),
            working_directory: ctx.current_dir.clone(),
        }
    }

    /// Replace the pass-through keys
    #[must_use]
    pub fn with_env_keys(mut self, keys: Vec<String>) -> Self {
        self.allowed_env_keys = keys;
        self
    }

    /// Set one variable explicitly
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }
}

/// Apply sandbox policy to a command before execution
///
/// This clears the subprocess environment, then re-injects only the
/// allowed keys from the host environment followed by the explicit
/// variables.
pub fn apply_sandbox(cmd: &mut Command, policy: &SandboxPolicy) {
    cmd.env_clear();

    let mut missing = Vec::new();
    for key in &policy.allowed_env_keys {
        if let Ok(value) = env::var(key) {
            cmd.env(key, &value);
        } else {
            missing.push(key.as_str());
        }
    }

    for (key, value) in &policy.extra_env {
        cmd.env(key, value);
    }

    if let Some(dir) = &policy.working_directory {
        cmd.current_dir(dir);
    }

    debug!(
        cwd = ?policy.working_directory,
        passed_through = policy.allowed_env_keys.len() - missing.len(),
        extra = policy.extra_env.len(),
        ?missing,
        "Applied sandbox policy"
    );
}
