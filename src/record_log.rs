// ABOUTME: Non-blocking miniSEED statistics extractor fed from a mirror of the response stream
// ABOUTME: Decodes only above a safety threshold, resynchronises after corruption, and aggregates per channel
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # Record logging
//!
//! [`RecordLogger`] sees the same bytes the client receives but never holds
//! them back. Bytes are appended to an unbounded mirror; decoding is only
//! attempted once the mirror holds at least one maximum record, so a record
//! either decodes or fails within bytes that are already present.
//!
//! After a failure the logger discards `available - max` bytes and waits
//! for more input. At end of stream [`RecordLogger::finish`] decodes what is
//! left down to the minimum record size and stops as soon as a pass makes no
//! progress.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::mseed::{self, DecodeError, SeedRecord, DEFAULT_RECORD_LEN, MAX_RECORD_LEN, MIN_RECORD_LEN};
use crate::types::ResponseStatus;
use crate::usage::RecordUsageEntry;

/// Identity of a channel in a response
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
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
}

/// Accumulated statistics of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    /// Bytes of records belonging to the channel
    pub bytes: u64,
    /// Earliest first-sample time
    pub earliest: DateTime<Utc>,
    /// Latest last-sample time
    pub latest: DateTime<Utc>,
}

/// Incremental per-channel statistics for a miniSEED stream
#[derive(Debug)]
pub struct RecordLogger {
    mirror: BytesMut,
    channels: BTreeMap<ChannelKey, ChannelStats>,
    max_record_len: usize,
    min_record_len: usize,
    decoded: u64,
    resyncs: u64,
    malformed_logged: bool,
}

impl Default for RecordLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordLogger {
    /// Logger with the standard 4096/256 byte record bounds
    #[must_use]
    pub fn new() -> Self {
        Self::with_bounds(MIN_RECORD_LEN, MAX_RECORD_LEN)
    }

    /// Logger with custom record bounds
    #[must_use]
    pub fn with_bounds(min_record_len: usize, max_record_len: usize) -> Self {
        Self {
            mirror: BytesMut::with_capacity(max_record_len * 2),
            channels: BTreeMap::new(),
            max_record_len,
            min_record_len: min_record_len.min(max_record_len),
            decoded: 0,
            resyncs: 0,
            malformed_logged: false,
        }
    }

    /// Mirror a chunk that was just forwarded to the client
    pub fn feed(&mut self, chunk: &[u8]) {
        self.mirror.extend_from_slice(chunk);

        while self.mirror.len() >= self.max_record_len {
            match mseed::decode(&self.mirror, Some(DEFAULT_RECORD_LEN)) {
                Ok(record) => self.consume(&record),
                Err(e) => {
                    self.note_malformed(&e);
                    let skip = self.mirror.len() - self.max_record_len;
                    if skip > 0 {
                        debug!(skip, "resynchronising record mirror");
                        self.mirror.advance(skip);
                        self.resyncs += 1;
                    }
                    break;
                }
            }
        }
    }

    /// Decode what is left once the stream has ended
    pub fn finish(&mut self) {
        let mut available = self.mirror.len();
        while self.mirror.len() >= self.min_record_len {
            match mseed::decode(&self.mirror, Some(DEFAULT_RECORD_LEN)) {
                Ok(record) => self.consume(&record),
                Err(e) => {
                    debug!(error = %e, remaining = self.mirror.len(), "undecodable tail");
                    break;
                }
            }
            if self.mirror.len() == available {
                info!(remaining = available, "Bad record found during logging, stopping tail pass");
                break;
            }
            available = self.mirror.len();
        }
        if !self.mirror.is_empty() {
            debug!(leftover = self.mirror.len(), "record mirror not fully decoded");
        }
    }

    fn consume(&mut self, record: &SeedRecord) {
        let length = record.len();
        if let SeedRecord::Data { header, .. } = record {
            let key = ChannelKey {
                network: header.network.clone(),
                station: header.station.clone(),
                location: header.location.clone(),
                channel: header.channel.clone(),
                quality: header.quality,
            };
            let start = header.start;
            let end = header.last_sample_time();
            self.channels
                .entry(key)
                .and_modify(|stats| {
                    stats.bytes += length as u64;
                    stats.earliest = stats.earliest.min(start);
                    stats.latest = stats.latest.max(end);
                })
                .or_insert(ChannelStats {
                    bytes: length as u64,
                    earliest: start,
                    latest: end,
                });
            self.decoded += 1;
        }
        self.mirror.advance(length);
    }

    fn note_malformed(&mut self, error: &DecodeError) {
        if !self.malformed_logged {
            warn!(error = %error, "Malformed miniSEED data in response, logging may be incomplete");
            self.malformed_logged = true;
        }
    }

    /// Statistics per channel, ordered by key
    pub fn channels(&self) -> impl Iterator<Item = (&ChannelKey, &ChannelStats)> {
        self.channels.iter()
    }

    /// Data records decoded so far
    #[must_use]
    pub const fn decoded_records(&self) -> u64 {
        self.decoded
    }

    /// Number of resynchronisation skips so far
    #[must_use]
    pub const fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Bytes mirrored but not yet decoded
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.mirror.len()
    }

    /// Turn the statistics into one usage entry per channel
    #[must_use]
    pub fn entries(&self, elapsed: Duration, status: ResponseStatus) -> Vec<RecordUsageEntry> {
        self.channels
            .iter()
            .map(|(key, stats)| RecordUsageEntry {
                bytes: stats.bytes,
                elapsed,
                status,
                network: key.network.clone(),
                station: key.station.clone(),
                location: key.location.clone(),
                channel: key.channel.clone(),
                quality: key.quality,
                earliest: stats.earliest,
                latest: stats.latest,
            })
            .collect()
    }
}
