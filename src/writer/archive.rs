// ABOUTME: Archive writer packaging the files a handler lists on stdout into one zip stream
// ABOUTME: Each entry is compressed into a staging file, then spliced into the response as the listing arrives
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use std::fmt::Display;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::raw::write_chunk;
use super::{WriteOutcome, RECORD_CHUNK_BYTES};
use crate::watchdog::Watchdog;

/// Archive chunks allowed in flight between the assembler and the sink
const CHUNK_QUEUE: usize = 4;

enum EntryError {
    /// The listed file could not be opened; the entry is skipped
    Missing(io::Error),
    /// The archive itself could not be written
    Archive(String),
}

fn archive_error(e: impl Display) -> EntryError {
    EntryError::Archive(e.to_string())
}

/// Forward-only archive target
///
/// Bytes are batched and handed to the async side in chunks. Seeking is
/// only allowed to the current position, which is all the zip writer asks
/// for when every entry arrives with its sizes and checksum known.
struct ChunkPipe {
    chunks: mpsc::Sender<Vec<u8>>,
    pending: Vec<u8>,
    position: u64,
}

impl ChunkPipe {
    fn new(chunks: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            chunks,
            pending: Vec::with_capacity(RECORD_CHUNK_BYTES),
            position: 0,
        }
    }
}

impl Write for ChunkPipe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.position += buf.len() as u64;
        if self.pending.len() >= RECORD_CHUNK_BYTES {
            self.flush()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let chunk = mem::replace(&mut self.pending, Vec::with_capacity(RECORD_CHUNK_BYTES));
        self.chunks
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive output closed"))
    }
}

impl Seek for ChunkPipe {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) | SeekFrom::End(delta) => self.position.checked_add_signed(delta),
        };
        if target == Some(self.position) {
            Ok(self.position)
        } else {
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "archive output cannot seek back",
            ))
        }
    }
}

/// Read one path per line from `source` and stream a zip of those files to `sink`
///
/// Blank lines are skipped and entries are named after the last path
/// segment. Files that cannot be opened are logged and skipped. Each
/// entry reaches the sink as soon as its file has been compressed, while
/// the handler may still be listing more.
pub async fn write_archive<R, W>(source: &mut R, sink: &mut W, watchdog: &Watchdog) -> WriteOutcome
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (path_tx, path_rx) = mpsc::unbounded_channel();
    let (chunk_tx, mut chunks) = mpsc::channel(CHUNK_QUEUE);
    let assembler = tokio::task::spawn_blocking(move || assemble(path_rx, ChunkPipe::new(chunk_tx)));

    let mut paths = Some(path_tx);
    let mut lines = source.lines();
    let mut failure = None;

    loop {
        tokio::select! {
            line = lines.next_line(), if paths.is_some() => match line {
                Ok(Some(line)) => {
                    watchdog.reschedule();
                    if let Some(paths) = &paths {
                        queue_entry(paths, &line);
                    }
                }
                Ok(None) => paths = None,
                Err(e) => {
                    warn!(error = %e, "Reading handler file list failed");
                    failure = Some(format!("Failure reading handler output: {e}"));
                    break;
                }
            },
            chunk = chunks.recv() => {
                let Some(chunk) = chunk else { break };
                if let Err(e) = write_chunk(sink, &chunk).await {
                    warn!(error = %e, "Response write failed (probable client disconnect)");
                    failure = Some(format!("Client write failed: {e}"));
                    break;
                }
                watchdog.reschedule();
            }
        }
    }

    if let Some(failure) = failure {
        return WriteOutcome::failed(failure);
    }
    match assembler.await {
        Ok(Ok(entries)) => {
            debug!(entries, "archive output complete");
            WriteOutcome::default()
        }
        Ok(Err(e)) => WriteOutcome::failed(format!("Failure writing archive: {e}")),
        Err(e) => WriteOutcome::failed(format!("Archive task failed: {e}")),
    }
}

fn queue_entry(paths: &mpsc::UnboundedSender<(PathBuf, String)>, line: &str) {
    let listed = line.trim();
    if listed.is_empty() {
        return;
    }
    let Some(name) = entry_name(listed) else {
        warn!(line = listed, "Listed path has no file name, skipping");
        return;
    };
    info!(path = listed, entry = %name, "Adding file to archive");
    // A closed queue means the assembler already failed; the loop reports it
    let _ = paths.send((PathBuf::from(listed), name));
}

fn entry_name(listed: &str) -> Option<String> {
    Path::new(listed)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Blocking side: splice each staged entry into the archive as it is queued
fn assemble(
    mut paths: mpsc::UnboundedReceiver<(PathBuf, String)>,
    pipe: ChunkPipe,
) -> Result<usize, String> {
    let mut archive = ZipWriter::new(pipe);
    let mut entries = 0usize;

    while let Some((path, name)) = paths.blocking_recv() {
        match stage_entry(&path, &name) {
            Ok((mut staged, size)) => {
                let entry = staged.by_index_raw(0).map_err(|e| e.to_string())?;
                archive.raw_copy_file(entry).map_err(|e| e.to_string())?;
                archive.flush().map_err(|e| e.to_string())?;
                entries += 1;
                debug!(size, "archive entry written");
            }
            Err(EntryError::Missing(e)) => {
                warn!(path = %path.display(), error = %e, "Listed file unavailable, skipping entry");
            }
            Err(EntryError::Archive(e)) => return Err(e),
        }
    }

    let mut pipe = archive.finish().map_err(|e| e.to_string())?;
    pipe.flush().map_err(|e| e.to_string())?;
    Ok(entries)
}

/// Compress one file into a single-entry staging archive, then delete it
fn stage_entry(path: &Path, name: &str) -> Result<(ZipArchive<File>, u64), EntryError> {
    let mut source = File::open(path).map_err(EntryError::Missing)?;
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut staging = ZipWriter::new(tempfile::tempfile().map_err(archive_error)?);
    staging.start_file(name, options).map_err(archive_error)?;
    let size = io::copy(&mut source, &mut staging).map_err(archive_error)?;
    drop(source);
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not delete archived file");
    }

    let staged = staging.finish().map_err(archive_error)?;
    let staged = ZipArchive::new(staged).map_err(archive_error)?;
    Ok((staged, size))
}
