// ABOUTME: Handler subprocess launch and two-phase termination (SIGTERM, grace, SIGKILL)
// ABOUTME: Wraps tokio::process with piped channels and a shareable, idempotent kill path
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::sandbox::{apply_sandbox, SandboxPolicy};
use crate::types::GatewayError;

/// A launched handler with its three I/O channels detached
///
/// The channels are handed to their consumers (request body writer,
/// output writer, error drain) while the [`ProcessHandle`] is kept for
/// status checks and termination.
pub struct LaunchedProcess {
    /// Shareable handle on the child
    pub handle: ProcessHandle,
    /// Handler stdin, where the request body goes
    pub stdin: Option<ChildStdin>,
    /// Handler stdout, the response payload
    pub stdout: ChildStdout,
    /// Handler stderr, drained in the background
    pub stderr: ChildStderr,
}

/// Spawn `command` with all three channels piped
///
/// # Errors
///
/// Returns `GatewayError` if the command line is empty or the process
/// cannot be spawned.
pub fn launch(command: &[String], policy: &SandboxPolicy) -> Result<LaunchedProcess, GatewayError> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| GatewayError::config("handler command line is empty"))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    apply_sandbox(&mut cmd, policy);

    let mut child = cmd
        .spawn()
        .map_err(|e| GatewayError::launch(program, e))?;

    let stdin = child.stdin.take();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| GatewayError::internal("handler stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| GatewayError::internal("handler stderr was not captured"))?;

    info!(pid = ?child.id(), command = ?command, "Started handler process");

    Ok(LaunchedProcess {
        handle: ProcessHandle::new(child),
        stdin,
        stdout,
        stderr,
    })
}

/// Clonable handle on a running handler
///
/// Shared between the orchestrator and the watchdog callback. All
/// operations are safe to call concurrently and repeatedly.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    child: Arc<Mutex<Child>>,
    pid: Option<u32>,
}

impl ProcessHandle {
    fn new(child: Child) -> Self {
        let pid = child.id();
        Self {
            child: Arc::new(Mutex::new(child)),
            pid,
        }
    }

    /// Native process id captured at launch
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the process has exited, without blocking
    ///
    /// # Errors
    ///
    /// Returns the OS error if the status cannot be queried.
    pub async fn try_wait(&self) -> std::io::Result<Option<ExitStatus>> {
        self.child.lock().await.try_wait()
    }

    /// Wait for the process to exit
    ///
    /// # Errors
    ///
    /// Returns the OS error if waiting fails.
    pub async fn wait(&self) -> std::io::Result<ExitStatus> {
        self.child.lock().await.wait().await
    }

    /// Stop the process: graceful request, grace period, then forced kill
    ///
    /// A process that has already exited is observed and left alone. The
    /// grace period ends early as soon as the process exits.
    pub async fn terminate(&self, grace: Duration) {
        let mut child = self.child.lock().await;

        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(pid = ?self.pid, ?status, "Handler already exited");
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(pid = ?self.pid, error = %e, "Could not query handler status"),
        }

        info!(pid = ?self.pid, ?grace, "Stopping handler process");
        send_terminate(&mut child);

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid = ?self.pid, ?status, "Handler terminated");
            }
            Ok(Err(e)) => {
                warn!(pid = ?self.pid, error = %e, "Wait after SIGTERM failed, killing");
                force_kill(&mut child);
            }
            Err(_) => {
                info!(pid = ?self.pid, "Handler recalcitrant, killing with SIGKILL");
                force_kill(&mut child);
                if let Ok(status) = child.wait().await {
                    debug!(pid = ?self.pid, ?status, "Handler reaped after SIGKILL");
                }
            }
        }
    }
}

/// Ask the process to exit (`SIGTERM`)
#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        warn!("Handler pid unavailable, cannot send SIGTERM");
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Terminate request failed");
    }
}

/// Kill the process unconditionally (`SIGKILL`) via its native pid
///
/// Fails soft: a missing pid or a refused signal is logged, never raised.
#[cfg(unix)]
fn force_kill(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        warn!("Couldn't get pid of handler process, skipping SIGKILL");
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        warn!(pid, error = %e, "Couldn't kill handler process");
    }
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(error = %e, "Couldn't kill handler process");
    }
}
