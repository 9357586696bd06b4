// ABOUTME: Process-backed streaming gateway core turning command-line handlers into response bodies
// ABOUTME: Re-exports the invocation API, request context, writers, and usage reporting types
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Shellgate: process-backed streaming responses
//!
//! Runs one external handler program per request, feeds it the request
//! body on stdin, and streams its stdout back as the response body. A
//! watchdog terminates handlers that stop producing output, and the
//! handler's exit code decides the status when it produces none.
//!
//! Output can be forwarded as-is, forwarded while miniSEED records are
//! decoded for per-channel usage logging, or treated as a list of files to
//! package into a zip archive.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use shellgate::{Decision, Invocation, OutputMode, RequestContext, TracingUsageSink};
//!
//! # async fn example() -> Result<(), shellgate::GatewayError> {
//! let ctx = RequestContext::new(["/usr/local/bin/fetch-data", "--net", "IU"])
//!     .with_output_mode(OutputMode::Mseed);
//! let usage = Arc::new(TracingUsageSink::new("dataselect"));
//!
//! match Invocation::new(ctx, usage).start().await? {
//!     Decision::Stream(response) => {
//!         let report = response.write(tokio::io::sink()).await;
//!         println!("shipped {} bytes", report.bytes);
//!     }
//!     Decision::Empty(status) => println!("no data: {status}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`types`]: response statuses, output modes, and `GatewayError`
//! - [`config`]: per-call `RequestContext` and gateway defaults
//! - [`sandbox`]: environment whitelisting and working directory control
//! - [`discovery`]: handler program resolution
//! - [`process`]: handler launch and two-phase termination
//! - [`drain`]: background stderr collection
//! - [`watchdog`]: reschedulable no-progress timer
//! - [`exit_status`]: exit code to status mapping
//! - [`mseed`]: miniSEED record header decoding
//! - [`record_log`]: non-blocking per-channel record statistics
//! - [`usage`]: usage sink trait and counters
//! - [`writer`]: raw, record, and archive writers
//! - [`streaming`]: the per-call orchestrator

/// Core types: statuses, output modes, and errors
pub mod types;

/// Per-call request context and defaults
pub mod config;
/// Handler program resolution
pub mod discovery;
/// Background stderr drain
pub mod drain;
/// Exit code mapping
pub mod exit_status;
/// miniSEED record decoding
pub mod mseed;
/// Handler subprocess management
pub mod process;
/// Per-channel record statistics
pub mod record_log;
/// Environment sandboxing
pub mod sandbox;
/// Call orchestration
pub mod streaming;
/// Usage and audit reporting
pub mod usage;
/// No-progress watchdog
pub mod watchdog;
/// Output writers
pub mod writer;

pub use config::RequestContext;
pub use streaming::{Decision, Invocation, StreamReport, StreamingResponse};
pub use types::{GatewayError, OutputMode, ResponseStatus};
pub use usage::{TracingUsageSink, UsageEntry, UsageSink, UsageStats};
