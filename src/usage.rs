// ABOUTME: Usage and audit reporting for completed calls and per-channel record statistics
// ABOUTME: Defines the UsageSink collaborator trait, entry types, atomic counters, and a tracing sink
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::types::ResponseStatus;

/// Message type attached to the binary-record summary line
pub const SUMMARY_MESSAGE_TYPE: &str = "_summary";

/// One audit record per completed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEntry {
    /// Optional sub-type of the entry (`_summary` for binary-record totals)
    pub message_type: Option<&'static str>,
    /// Bytes sent to the client
    pub bytes: u64,
    /// Wall-clock time since the call started
    pub elapsed: Duration,
    /// Final status of the call
    pub status: ResponseStatus,
    /// Error text, if the call failed
    pub error: Option<String>,
}

/// One audit record per distinct channel in a binary-record response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUsageEntry {
    /// Bytes of records that belong to this channel
    pub bytes: u64,
    /// Wall-clock time since the call started
    pub elapsed: Duration,
    /// Final status of the call
    pub status: ResponseStatus,
    /// Network code
    pub network: String,
    /// Station code
    pub station: String,
    /// Location code
    pub location: String,
    /// Channel code
    pub channel: String,
    /// Data quality indicator
    pub quality: char,
    /// Earliest sample time seen for the channel
    pub earliest: DateTime<Utc>,
    /// Latest sample time seen for the channel
    pub latest: DateTime<Utc>,
}

/// Receiver of usage and audit entries
///
/// Implementations must be cheap and non-blocking: they are called on the
/// call's own execution context after streaming has finished.
pub trait UsageSink: Send + Sync {
    /// Record a completed call
    fn log_usage(&self, entry: &UsageEntry);

    /// Record the statistics of one channel of a binary-record response
    fn log_record_usage(&self, entry: &RecordUsageEntry);
}

/// Usage sink writing entries to the `usage` tracing target
#[derive(Debug, Clone, Default)]
pub struct TracingUsageSink {
    /// Application name stamped on every entry
    pub app_name: String,
}

impl TracingUsageSink {
    /// Create a sink for the named application
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl UsageSink for TracingUsageSink {
    fn log_usage(&self, entry: &UsageEntry) {
        info!(
            target: "usage",
            app = %self.app_name,
            message_type = entry.message_type.unwrap_or(""),
            bytes = entry.bytes,
            elapsed_ms = entry.elapsed.as_millis() as u64,
            status = entry.status.code(),
            error = entry.error.as_deref().unwrap_or(""),
            "request completed"
        );
    }

    fn log_record_usage(&self, entry: &RecordUsageEntry) {
        info!(
            target: "usage",
            app = %self.app_name,
            bytes = entry.bytes,
            elapsed_ms = entry.elapsed.as_millis() as u64,
            status = entry.status.code(),
            network = %entry.network,
            station = %entry.station,
            location = %entry.location,
            channel = %entry.channel,
            quality = %entry.quality,
            earliest = %entry.earliest.format("%Y-%m-%dT%H:%M:%S%.4f"),
            latest = %entry.latest.format("%Y-%m-%dT%H:%M:%S%.4f"),
            "channel shipped"
        );
    }
}

/// Process-wide counters shared by every call of a service
#[derive(Debug, Default)]
pub struct UsageStats {
    requests: AtomicU64,
    shipped_bytes: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`UsageStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    /// Completed calls
    pub requests: u64,
    /// Total bytes shipped
    pub shipped_bytes: u64,
    /// Calls that failed before streaming
    pub errors: u64,
}

impl UsageStats {
    /// Count a completed call and the bytes it shipped
    pub fn record_shipped(&self, bytes: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.shipped_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count a call that failed before streaming
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Read the current counters
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            shipped_bytes: self.shipped_bytes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
