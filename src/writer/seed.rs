// ABOUTME: miniSEED-aware passthrough writer that forwards bytes before parsing them
// ABOUTME: Mirrors every forwarded chunk into a RecordLogger for per-channel usage statistics
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, warn};

use super::raw::write_chunk;
use super::{WriteOutcome, RECORD_CHUNK_BYTES};
use crate::record_log::RecordLogger;
use crate::watchdog::Watchdog;

/// Forward `source` to `sink`, collecting record statistics on the side
///
/// The client always gets a chunk before the logger sees it. Statistics
/// cover exactly the bytes that reached the sink.
pub async fn write_records<R, W>(
    source: &mut R,
    sink: &mut W,
    watchdog: &Watchdog,
) -> WriteOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; RECORD_CHUNK_BYTES];
    let mut logger = RecordLogger::new();
    let mut failure = None;

    loop {
        let n = match source.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "Reading handler output failed");
                failure = Some(format!("Failure reading handler output: {e}"));
                break;
            }
        };
        if let Err(e) = write_chunk(sink, &buffer[..n]).await {
            warn!(error = %e, "Response write failed (probable client disconnect)");
            failure = Some(format!("Client write failed: {e}"));
            break;
        }
        watchdog.reschedule();
        logger.feed(&buffer[..n]);
    }

    logger.finish();
    debug!(
        records = logger.decoded_records(),
        resyncs = logger.resyncs(),
        "record output complete"
    );
    WriteOutcome {
        failure,
        records: Some(logger),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mseed::testdata::{record, RecordSpec};

    #[tokio::test]
    async fn forwards_bytes_and_counts_records() {
        let mut data = Vec::new();
        for station in ["ANMO", "COLA", "ANMO"] {
            data.extend(record(&RecordSpec {
                station,
                ..RecordSpec::default()
            }));
        }
        let mut source = &data[..];
        let mut sink = Vec::new();
        let watchdog = Watchdog::new(Duration::from_secs(1));

        let outcome = write_records(&mut source, &mut sink, &watchdog).await;
        assert!(outcome.failure.is_none());
        assert_eq!(sink, data);

        let logger = outcome.records.unwrap();
        assert_eq!(logger.decoded_records(), 3);
        let stations: Vec<(String, u64)> = logger
            .channels()
            .map(|(k, s)| (k.station.clone(), s.bytes))
            .collect();
        assert_eq!(
            stations,
            vec![("ANMO".to_owned(), 1024), ("COLA".to_owned(), 512)]
        );
    }

    #[tokio::test]
    async fn garbage_is_forwarded_untouched() {
        let data = vec![0xA5u8; 20_000];
        let mut source = &data[..];
        let mut sink = Vec::new();
        let watchdog = Watchdog::new(Duration::from_secs(1));

        let outcome = write_records(&mut source, &mut sink, &watchdog).await;
        assert!(outcome.failure.is_none());
        assert_eq!(sink, data);
        assert_eq!(outcome.records.unwrap().decoded_records(), 0);
    }

    #[tokio::test]
    async fn sink_failure_keeps_partial_statistics() {
        let data: Vec<u8> = (0..4).flat_map(|_| record(&RecordSpec::default())).collect();
        let mut source = &data[..];
        let mut sink = crate::writer::ClosingSink::new(100);
        let watchdog = Watchdog::new(Duration::from_secs(1));

        let outcome = write_records(&mut source, &mut sink, &watchdog).await;
        assert!(outcome.failure.is_some());
        assert_eq!(outcome.records.unwrap().decoded_records(), 0);
    }
}
