// ABOUTME: Server state holding the validated service file, resolved handlers, and usage reporting
// ABOUTME: Built once at startup and shared read-only across requests
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::path::PathBuf;
use std::sync::Arc;

use shellgate::discovery::resolve_handler;
use shellgate::{GatewayError, TracingUsageSink, UsageSink, UsageStats};
use tracing::info;

use crate::config::{EndpointConfig, ServiceConfig, ServiceSection};

/// Shared server state handle
pub type SharedState = Arc<ServerState>;

/// An endpoint whose handler program has been resolved
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// Endpoint settings from the service file
    pub config: EndpointConfig,
    /// Absolute path of the handler program
    pub program: PathBuf,
}

/// Immutable per-process server state
///
/// Handlers are resolved once at startup, so a missing program fails the
/// launch of the server rather than the first request.
pub struct ServerState {
    service: ServiceSection,
    endpoints: Vec<Endpoint>,
    stats: Arc<UsageStats>,
    usage: Arc<dyn UsageSink>,
}

impl ServerState {
    /// Resolve every endpoint's handler and log usage through tracing
    pub fn new(config: ServiceConfig) -> Result<Self, GatewayError> {
        let usage = Arc::new(TracingUsageSink::new(config.service.app_name.clone()));
        Self::with_usage_sink(config, usage)
    }

    /// Same as [`ServerState::new`] with a custom usage sink
    pub fn with_usage_sink(
        config: ServiceConfig,
        usage: Arc<dyn UsageSink>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let endpoints = config
            .endpoints
            .into_iter()
            .map(|endpoint| {
                let program = resolve_handler(&endpoint.handler, endpoint.handler_dir.as_deref())?;
                info!(
                    endpoint = %endpoint.name,
                    program = %program.display(),
                    output = %endpoint.output,
                    "Registered endpoint"
                );
                Ok(Endpoint {
                    config: endpoint,
                    program,
                })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        Ok(Self {
            service: config.service,
            endpoints,
            stats: Arc::new(UsageStats::default()),
            usage,
        })
    }

    /// Service identity
    pub const fn service(&self) -> &ServiceSection {
        &self.service
    }

    /// Endpoint by name
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.config.name == name)
    }

    /// All endpoints in file order
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Counters shared by every call
    pub fn stats(&self) -> Arc<UsageStats> {
        Arc::clone(&self.stats)
    }

    /// Usage sink shared by every call
    pub fn usage(&self) -> Arc<dyn UsageSink> {
        Arc::clone(&self.usage)
    }
}
