// ABOUTME: Background drain of a handler's stderr into a single write-once text buffer
// ABOUTME: Exposes the result as a one-shot broadcast cell that every waiter observes in full
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Chunk size for stderr reads
const DRAIN_CHUNK_BYTES: usize = 1024;

/// Outcome published once the error channel is exhausted
type DrainOutcome = Result<String, DrainError>;

/// I/O failure that stopped the drain before end-of-channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainError {
    /// Kind of the underlying I/O error
    pub kind: io::ErrorKind,
    /// Message of the underlying I/O error
    pub message: String,
}

impl std::fmt::Display for DrainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error channel read failed: {}", self.message)
    }
}

impl std::error::Error for DrainError {}

/// Handle to a running stderr drain
///
/// The drain task owns the channel and closes it on completion. Every
/// clone of the handle can wait for the result; all waiters are released
/// together once the buffer is complete.
#[derive(Debug, Clone)]
pub struct ErrorDrain {
    rx: watch::Receiver<Option<DrainOutcome>>,
}

impl ErrorDrain {
    /// Start draining `channel` on a background task
    pub fn spawn<R>(channel: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        tokio::spawn(async move {
            let outcome = read_to_text(channel).await;
            if let Err(e) = &outcome {
                warn!(error = %e, "stderr drain stopped early");
            }
            // Receivers may all be gone when the call was abandoned
            let _ = tx.send(Some(outcome));
        });
        Self { rx }
    }

    /// Wait for the drain to finish and return the full text
    ///
    /// # Errors
    ///
    /// Returns the I/O failure that prevented the buffer from completing.
    pub async fn text(&self) -> Result<String, DrainError> {
        let mut rx = self.rx.clone();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map(|guard| guard.clone())
            .map_err(|_| DrainError {
                kind: io::ErrorKind::BrokenPipe,
                message: "drain task ended without a result".to_owned(),
            })?;
        outcome.unwrap_or_else(|| Ok(String::new()))
    }

    /// Full text, or a placeholder when it could not be read
    pub async fn text_or_placeholder(&self) -> String {
        self.text()
            .await
            .unwrap_or_else(|_| "No error description available".to_owned())
    }

    /// Whether the drain has finished
    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

async fn read_to_text<R>(mut channel: R) -> DrainOutcome
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    let mut chunk = [0u8; DRAIN_CHUNK_BYTES];
    loop {
        match channel.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => collected.extend_from_slice(&chunk[..n]),
            Err(e) => {
                return Err(DrainError {
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        }
    }
    drop(channel);
    debug!(bytes = collected.len(), "stderr drained");
    Ok(String::from_utf8_lossy(&collected).into_owned())
}
