// ABOUTME: Output writers that pump handler stdout into the response sink
// ABOUTME: Shared outcome type, chunk sizes, and a byte-counting sink wrapper
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Writers
//!
//! Each writer reads the handler's output until end-of-channel, pushes it to
//! the sink, and restarts the watchdog after every unit of progress. A sink
//! or read failure stops the writer and is returned in
//! [`WriteOutcome::failure`]; it is never raised, since the response status
//! is already committed.

mod archive;
mod raw;
mod seed;

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use crate::record_log::RecordLogger;

pub use archive::write_archive;
pub use raw::write_raw;
pub use seed::write_records;

/// Read size of the raw writer
pub const RAW_CHUNK_BYTES: usize = 1024;

/// Read size of the record and archive writers, a multiple of the largest record
pub const RECORD_CHUNK_BYTES: usize = 32768;

/// What a writer did before it stopped
#[derive(Debug, Default)]
pub struct WriteOutcome {
    /// Why the writer stopped early, if it did
    pub failure: Option<String>,
    /// Per-channel statistics, for the record writer
    pub records: Option<RecordLogger>,
}

impl WriteOutcome {
    fn failed(failure: impl Into<String>) -> Self {
        Self {
            failure: Some(failure.into()),
            records: None,
        }
    }
}

/// Sink wrapper counting the bytes the inner sink accepted
///
/// Partial writes are counted exactly, so a sink that fails part-way
/// through a chunk reports only what it took.
#[derive(Debug)]
pub struct CountingSink<W> {
    inner: W,
    written: u64,
}

impl<W> CountingSink<W> {
    /// Wrap `inner` with a zero count
    pub const fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Bytes accepted so far
    pub const fn written(&self) -> u64 {
        self.written
    }

    /// Unwrap the inner sink
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for CountingSink<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            self.written += n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Sink that accepts a fixed number of bytes and then fails like a closed socket
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ClosingSink {
    pub(crate) accepted: Vec<u8>,
    pub(crate) limit: usize,
}

#[cfg(test)]
impl ClosingSink {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            accepted: Vec::new(),
            limit,
        }
    }
}

#[cfg(test)]
impl AsyncWrite for ClosingSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let room = self.limit - self.accepted.len();
        if room == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "client went away",
            )));
        }
        let n = room.min(buf.len());
        self.accepted.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
