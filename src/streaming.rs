// ABOUTME: Per-call orchestrator from handler launch through status decision, streaming, and cleanup
// ABOUTME: Invocation::start decides the status before headers; StreamingResponse::write pumps the body
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Streaming orchestration
//!
//! A call runs in two steps so the host can commit its status line in
//! between:
//!
//! 1. [`Invocation::start`] launches the handler, feeds it the request
//!    body, and waits until either output is readable or the handler exits
//!    without output. The result is a [`Decision`], or a [`GatewayError`]
//!    carrying the mapped status.
//! 2. [`StreamingResponse::write`] runs the writer for the configured
//!    output mode, then stops the handler and reports usage. It never
//!    fails: once bytes are on the wire, problems are only logged.
//!
//! Every path emits exactly one usage entry and releases the process, its
//! channels, and the archive working directory.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tracing::{debug, error, info, warn};

use crate::config::{RequestContext, OUTPUT_DIR_FLAG, POLL_INTERVAL, STDERR_WAIT};
use crate::drain::ErrorDrain;
use crate::exit_status::{exit_code, status_for_exit_code};
use crate::process::{launch, LaunchedProcess, ProcessHandle};
use crate::sandbox::SandboxPolicy;
use crate::types::{GatewayError, OutputMode, ResponseStatus};
use crate::usage::{UsageEntry, UsageSink, SUMMARY_MESSAGE_TYPE};
use crate::watchdog::Watchdog;
use crate::writer::{
    write_archive, write_raw, write_records, CountingSink, WriteOutcome, RECORD_CHUNK_BYTES,
};

/// Prefix of archive working directories
const WORKDIR_PREFIX: &str = "wsszip";

/// Outcome of the status decision step
pub enum Decision {
    /// Output is available; the body must be streamed with status 200
    Stream(StreamingResponse),
    /// The handler finished without output (204, or 404 by policy)
    Empty(ResponseStatus),
}

impl std::fmt::Debug for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream"),
            Self::Empty(status) => write!(f, "Empty({status})"),
        }
    }
}

/// Summary of a streamed response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReport {
    /// Bytes accepted by the sink
    pub bytes: u64,
    /// Time since the call started
    pub elapsed: Duration,
    /// Why streaming stopped early, if it did
    pub failure: Option<String>,
    /// Data records decoded, for binary-record output
    pub decoded_records: Option<u64>,
    /// Resynchronisation skips, for binary-record output
    pub resyncs: Option<u64>,
}

/// A call that has not been started yet
pub struct Invocation {
    ctx: RequestContext,
    usage: Arc<dyn UsageSink>,
    started: Instant,
}

impl Invocation {
    /// Prepare a call; the clock starts now
    pub fn new(ctx: RequestContext, usage: Arc<dyn UsageSink>) -> Self {
        Self {
            ctx,
            usage,
            started: Instant::now(),
        }
    }

    /// Launch the handler and decide the response status
    ///
    /// # Errors
    ///
    /// Returns `GatewayError` when the handler cannot be launched, the
    /// request body cannot be delivered, or the handler exits without output
    /// with an error code. The process is stopped and usage is logged
    /// before the error is returned.
    pub async fn start(self) -> Result<Decision, GatewayError> {
        let Self {
            ctx,
            usage,
            started,
        } = self;

        let workdir = if ctx.output_mode.needs_working_directory() {
            match create_workdir(&ctx) {
                Ok(dir) => Some(dir),
                Err(e) => return Err(fail_before_launch(&ctx, usage.as_ref(), started, e)),
            }
        } else {
            None
        };

        let mut command = ctx.command.clone();
        if let Some(dir) = &workdir {
            command.push(OUTPUT_DIR_FLAG.to_owned());
            command.push(dir.path().display().to_string());
        }

        let policy = SandboxPolicy::from_context(&ctx);
        let LaunchedProcess {
            handle,
            stdin,
            stdout,
            stderr,
        } = match launch(&command, &policy) {
            Ok(launched) => launched,
            Err(e) => {
                release_workdir(workdir);
                return Err(fail_before_launch(&ctx, usage.as_ref(), started, e));
            }
        };

        let watchdog = arm_watchdog(&handle, ctx.timeout, ctx.sigkill_delay);
        let drain = ErrorDrain::spawn(stderr);
        let call = Call {
            ctx,
            usage,
            started,
            handle,
            drain,
            watchdog,
            workdir,
        };

        let delivered = write_request_body(stdin, call.ctx.request_body.as_deref()).await;
        if let Err(e) = delivered {
            return Err(call.abort(e).await);
        }

        let mut output = BufReader::with_capacity(RECORD_CHUNK_BYTES, stdout);
        let signal = wait_for_signal(&call.handle, &mut output).await;
        match signal {
            Ok(Signal::Data) => {
                call.watchdog.cancel();
                debug!(pid = ?call.handle.pid(), "handler output available");
                Ok(Decision::Stream(StreamingResponse { call, output }))
            }
            Ok(Signal::Exited(status)) => {
                drop(output);
                let mapped = call.status_for_exit(status).await;
                match mapped {
                    Ok(status) => Ok(Decision::Empty(call.finish_empty(status).await)),
                    Err(e) => Err(call.abort(e).await),
                }
            }
            Err(e) => {
                drop(output);
                let e = GatewayError::internal(format!("Failure reading handler output: {e}"));
                Err(call.abort(e).await)
            }
        }
    }
}

/// A call whose status is committed and whose body is ready to stream
pub struct StreamingResponse {
    call: Call,
    output: BufReader<ChildStdout>,
}

impl StreamingResponse {
    /// Output mode of the call
    pub const fn output_mode(&self) -> OutputMode {
        self.call.ctx.output_mode
    }

    /// Stream the body into `sink`, then stop the handler and log usage
    ///
    /// Returns once the sink has been shut down. Sink and read failures end
    /// the stream early and are reported in the returned report only.
    pub async fn write<W>(self, sink: W) -> StreamReport
    where
        W: AsyncWrite + Unpin + Send,
    {
        let Self { call, mut output } = self;
        let mut sink = CountingSink::new(sink);

        let watchdog = arm_watchdog(&call.handle, call.ctx.timeout, call.ctx.sigkill_delay);
        let outcome = match call.ctx.output_mode {
            OutputMode::Raw => write_raw(&mut output, &mut sink, &watchdog).await,
            OutputMode::Mseed => write_records(&mut output, &mut sink, &watchdog).await,
            OutputMode::Zip => write_archive(&mut output, &mut sink, &watchdog).await,
        };

        watchdog.cancel();
        drop(output);
        if let Err(e) = sink.shutdown().await {
            debug!(error = %e, "response sink shutdown failed");
        }
        call.finish_stream(sink.written(), outcome).await
    }
}

/// Resources of a launched call
struct Call {
    ctx: RequestContext,
    usage: Arc<dyn UsageSink>,
    started: Instant,
    handle: ProcessHandle,
    drain: ErrorDrain,
    watchdog: Watchdog,
    workdir: Option<TempDir>,
}

impl Call {
    async fn status_for_exit(&self, status: ExitStatus) -> Result<ResponseStatus, GatewayError> {
        let stderr = self.error_text().await;
        let Some(code) = exit_code(&status) else {
            return Err(GatewayError::internal(format!(
                "Handler exit status unavailable: {}",
                stderr.trim()
            )));
        };
        info!(pid = ?self.handle.pid(), code, "Handler exited without output");
        status_for_exit_code(code, self.ctx.use_404_for_204, &stderr)
    }

    /// Handler stderr, given a short bound since a backgrounded child may hold it open
    async fn error_text(&self) -> String {
        let bound = STDERR_WAIT.min(self.ctx.timeout);
        match tokio::time::timeout(bound, self.drain.text_or_placeholder()).await {
            Ok(text) => text,
            Err(_) => {
                warn!(pid = ?self.handle.pid(), "stderr still open after handler exit");
                String::new()
            }
        }
    }

    async fn stop(&mut self) {
        self.watchdog.cancel();
        self.handle.terminate(self.ctx.sigkill_delay).await;
        release_workdir(self.workdir.take());
    }

    async fn abort(mut self, err: GatewayError) -> GatewayError {
        self.stop().await;
        error!(
            pid = ?self.handle.pid(),
            status = err.status.code(),
            message = %err.message,
            "Handler call failed"
        );
        self.ctx.stats.record_error();
        self.usage.log_usage(&UsageEntry {
            message_type: None,
            bytes: 0,
            elapsed: self.started.elapsed(),
            status: err.status,
            error: Some(err.message.clone()),
        });
        err
    }

    async fn finish_empty(mut self, status: ResponseStatus) -> ResponseStatus {
        self.stop().await;
        self.ctx.stats.record_shipped(0);
        self.usage.log_usage(&UsageEntry {
            message_type: None,
            bytes: 0,
            elapsed: self.started.elapsed(),
            status,
            error: None,
        });
        status
    }

    async fn finish_stream(mut self, bytes: u64, outcome: WriteOutcome) -> StreamReport {
        self.stop().await;
        let elapsed = self.started.elapsed();
        let status = ResponseStatus::Ok;

        if let Some(failure) = &outcome.failure {
            warn!(pid = ?self.handle.pid(), bytes, failure = %failure, "Streaming stopped early");
        }
        info!(pid = ?self.handle.pid(), bytes, ?elapsed, "Done, wrote response");

        let message_type = if let Some(logger) = &outcome.records {
            for entry in logger.entries(elapsed, status) {
                self.usage.log_record_usage(&entry);
            }
            Some(SUMMARY_MESSAGE_TYPE)
        } else {
            None
        };

        self.ctx.stats.record_shipped(bytes);
        self.usage.log_usage(&UsageEntry {
            message_type,
            bytes,
            elapsed,
            status,
            error: outcome.failure.clone(),
        });

        StreamReport {
            bytes,
            elapsed,
            failure: outcome.failure,
            decoded_records: outcome.records.as_ref().map(|r| r.decoded_records()),
            resyncs: outcome.records.as_ref().map(|r| r.resyncs()),
        }
    }
}

enum Signal {
    Data,
    Exited(ExitStatus),
}

/// Wait until output is readable or the handler has exited with nothing to read
///
/// Readability wins: bytes left in the pipe by a handler that has already
/// exited are still streamed. The check never consumes output.
async fn wait_for_signal(
    handle: &ProcessHandle,
    output: &mut BufReader<ChildStdout>,
) -> std::io::Result<Signal> {
    loop {
        let exited = handle.try_wait().await?;
        match tokio::time::timeout(POLL_INTERVAL, output.fill_buf()).await {
            Ok(Ok(buf)) if !buf.is_empty() => return Ok(Signal::Data),
            Ok(Ok(_)) => {
                if let Some(status) = exited {
                    return Ok(Signal::Exited(status));
                }
                // stdout closed but the handler is still running
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                if let Some(status) = exited {
                    return Ok(Signal::Exited(status));
                }
            }
        }
    }
}

async fn write_request_body(
    stdin: Option<ChildStdin>,
    body: Option<&[u8]>,
) -> Result<(), GatewayError> {
    let (Some(mut stdin), Some(body)) = (stdin, body) else {
        return Ok(());
    };
    stdin.write_all(body).await.map_err(GatewayError::input_write)?;
    stdin.flush().await.map_err(GatewayError::input_write)?;
    debug!(bytes = body.len(), "request body delivered");
    Ok(())
}

fn arm_watchdog(handle: &ProcessHandle, timeout: Duration, grace: Duration) -> Watchdog {
    let handle = handle.clone();
    Watchdog::armed(timeout, move || async move {
        warn!(pid = ?handle.pid(), ?timeout, "Handler made no progress, terminating");
        handle.terminate(grace).await;
    })
}

fn create_workdir(ctx: &RequestContext) -> Result<TempDir, GatewayError> {
    let root = ctx.working_root.as_deref().ok_or_else(|| {
        GatewayError::config("archive output requires a working directory root")
    })?;
    let dir = tempfile::Builder::new()
        .prefix(WORKDIR_PREFIX)
        .tempdir_in(root)
        .map_err(|e| {
            GatewayError::internal(format!(
                "Could not create working directory under {}: {e}",
                root.display()
            ))
        })?;
    debug!(dir = %dir.path().display(), "created archive working directory");
    Ok(dir)
}

fn release_workdir(workdir: Option<TempDir>) {
    let Some(dir) = workdir else {
        return;
    };
    let path = dir.path().to_path_buf();
    if let Err(e) = dir.close() {
        warn!(dir = %path.display(), error = %e, "Could not remove working directory");
    }
}

fn fail_before_launch(
    ctx: &RequestContext,
    usage: &dyn UsageSink,
    started: Instant,
    err: GatewayError,
) -> GatewayError {
    error!(program = ctx.program(), message = %err.message, "Handler could not be started");
    ctx.stats.record_error();
    usage.log_usage(&UsageEntry {
        message_type: None,
        bytes: 0,
        elapsed: started.elapsed(),
        status: err.status,
        error: Some(err.message.clone()),
    });
    err
}
