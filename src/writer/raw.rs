// ABOUTME: Raw writer copying handler stdout to the response in fixed-size chunks
// ABOUTME: Every forwarded chunk is flushed and restarts the watchdog countdown
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::{WriteOutcome, RAW_CHUNK_BYTES};
use crate::watchdog::Watchdog;

/// Copy `source` to `sink` until end-of-channel or failure
pub async fn write_raw<R, W>(source: &mut R, sink: &mut W, watchdog: &Watchdog) -> WriteOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; RAW_CHUNK_BYTES];
    let mut forwarded: u64 = 0;
    loop {
        let n = match source.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Reading handler output failed");
                return WriteOutcome::failed(format!("Failure reading handler output: {e}"));
            }
        };
        if let Err(e) = write_chunk(sink, &buffer[..n]).await {
            warn!(error = %e, forwarded, "Response write failed (probable client disconnect)");
            return WriteOutcome::failed(format!("Client write failed: {e}"));
        }
        forwarded += n as u64;
        watchdog.reschedule();
    }
    debug!(forwarded, "raw output complete");
    WriteOutcome::default()
}

pub(super) async fn write_chunk<W>(sink: &mut W, chunk: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(chunk).await?;
    sink.flush().await
}
