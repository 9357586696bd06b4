// ABOUTME: Decoder for SEED 2.x data records (miniSEED) used for per-channel usage logging
// ABOUTME: Parses the 48-byte fixed header, blockette 1000 record length, BTIME, and sample rate
//
// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2026 dravr.ai

//! # miniSEED records
//!
//! Only the parts needed for logging are decoded: the channel identity, the
//! record length, and the time span. Sample payloads are never touched.
//!
//! Decoding works on a byte slice and never waits for more input. A record
//! whose declared length exceeds the slice is reported as
//! [`DecodeError::Truncated`], so callers decide how much data must be
//! present before they try.

use std::fmt;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

/// Length of the fixed section of a data header
pub const FIXED_HEADER_LEN: usize = 48;

/// Largest record length the logger expects to see
pub const MAX_RECORD_LEN: usize = 4096;

/// Smallest record length worth attempting at end of stream
pub const MIN_RECORD_LEN: usize = 256;

/// Record length assumed when a record carries no blockette 1000
pub const DEFAULT_RECORD_LEN: usize = 4096;

const BLOCKETTE_1000: u16 = 1000;
const MAX_BLOCKETTES: usize = 32;

/// Why a record could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes than the record needs
    Truncated {
        /// Bytes the record needs
        needed: usize,
        /// Bytes that were available
        available: usize,
    },
    /// Sequence number is not ASCII digits
    BadSequence,
    /// Unknown data quality or record type indicator
    BadIndicator(u8),
    /// Identifier fields are not printable ASCII
    BadIdentifier,
    /// Start time fields are out of range in both byte orders
    BadStartTime,
    /// Blockette 1000 record length exponent is out of range
    BadRecordLength(u8),
    /// No blockette 1000 and no default length
    MissingRecordLength,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { needed, available } => {
                write!(f, "record needs {needed} bytes, {available} available")
            }
            Self::BadSequence => write!(f, "sequence number is not numeric"),
            Self::BadIndicator(b) => write!(f, "unknown record indicator 0x{b:02x}"),
            Self::BadIdentifier => write!(f, "identifier fields are not printable ASCII"),
            Self::BadStartTime => write!(f, "start time is out of range"),
            Self::BadRecordLength(exp) => write!(f, "record length exponent {exp} out of range"),
            Self::MissingRecordLength => write!(f, "record has no blockette 1000"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Fixed-header fields of a data record
#[derive(Debug, Clone, PartialEq)]
pub struct DataHeader {
    /// Data quality indicator (`D`, `R`, `Q` or `M`)
    pub quality: char,
    /// Network code
    pub network: String,
    /// Station code
    pub station: String,
    /// Location code
    pub location: String,
    /// Channel code
    pub channel: String,
    /// Time of the first sample, time correction applied
    pub start: DateTime<Utc>,
    /// Number of samples in the record
    pub num_samples: u16,
    /// Nominal sample rate in Hz, 0 when unspecified
    pub sample_rate: f64,
}

impl DataHeader {
    /// Time of the last sample in the record
    ///
    /// A span that would leave the representable time range (a near-zero
    /// rate on a full record) collapses to the start time.
    #[must_use]
    pub fn last_sample_time(&self) -> DateTime<Utc> {
        if self.num_samples == 0 || self.sample_rate <= 0.0 {
            return self.start;
        }
        let span_us = (f64::from(self.num_samples - 1) / self.sample_rate * 1_000_000.0).round();
        self.start
            .checked_add_signed(TimeDelta::microseconds(span_us as i64))
            .unwrap_or(self.start)
    }
}

/// A decoded SEED record
#[derive(Debug, Clone, PartialEq)]
pub enum SeedRecord {
    /// Time-series data record
    Data {
        /// Decoded fixed header
        header: DataHeader,
        /// Record length in bytes
        length: usize,
    },
    /// Volume, abbreviation, station or time-span control record
    Control {
        /// Record length in bytes
        length: usize,
    },
}

impl SeedRecord {
    /// Bytes occupied by the record
    #[must_use]
    pub const fn len(&self) -> usize {
        match self {
            Self::Data { length, .. } | Self::Control { length } => *length,
        }
    }

    /// Whether the record is empty (never true for decoded records)
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode the record at the start of `buf`
///
/// `default_len` is used when the record does not declare its length.
///
/// # Errors
///
/// Returns `DecodeError` when the bytes are not a plausible record or the
/// record is longer than `buf`.
pub fn decode(buf: &[u8], default_len: Option<usize>) -> Result<SeedRecord, DecodeError> {
    if buf.len() < FIXED_HEADER_LEN {
        return Err(DecodeError::Truncated {
            needed: FIXED_HEADER_LEN,
            available: buf.len(),
        });
    }

    if !buf[..6].iter().all(|b| b.is_ascii_digit() || *b == b' ') {
        return Err(DecodeError::BadSequence);
    }

    let indicator = buf[6];
    match indicator {
        b'D' | b'R' | b'Q' | b'M' => decode_data(buf, indicator, default_len),
        b'V' | b'A' | b'S' | b'T' => {
            let length = default_len.ok_or(DecodeError::MissingRecordLength)?;
            ensure_available(buf, length)?;
            Ok(SeedRecord::Control { length })
        }
        other => Err(DecodeError::BadIndicator(other)),
    }
}

fn decode_data(
    buf: &[u8],
    indicator: u8,
    default_len: Option<usize>,
) -> Result<SeedRecord, DecodeError> {
    let station = ident(&buf[8..13])?;
    let location = ident(&buf[13..15])?;
    let channel = ident(&buf[15..18])?;
    let network = ident(&buf[18..20])?;

    let order = ByteOrder::detect(&buf[20..24]).ok_or(DecodeError::BadStartTime)?;
    let mut start = btime(&buf[20..30], order).ok_or(DecodeError::BadStartTime)?;

    let num_samples = order.u16(&buf[30..32]);
    let factor = order.i16(&buf[32..34]);
    let multiplier = order.i16(&buf[34..36]);
    let activity_flags = buf[36];
    let correction = order.i32(&buf[40..44]);
    let first_blockette = usize::from(order.u16(&buf[46..48]));

    // Bit 1 set means the correction is already included in the start time
    if activity_flags & 0x02 == 0 && correction != 0 {
        start += TimeDelta::microseconds(i64::from(correction) * 100);
    }

    let length = match find_record_length(buf, first_blockette, order)? {
        Some(length) => length,
        None => default_len.ok_or(DecodeError::MissingRecordLength)?,
    };
    ensure_available(buf, length)?;

    Ok(SeedRecord::Data {
        header: DataHeader {
            quality: char::from(indicator),
            network,
            station,
            location,
            channel,
            start,
            num_samples,
            sample_rate: sample_rate(factor, multiplier),
        },
        length,
    })
}

fn ensure_available(buf: &[u8], length: usize) -> Result<(), DecodeError> {
    if buf.len() < length {
        return Err(DecodeError::Truncated {
            needed: length,
            available: buf.len(),
        });
    }
    Ok(())
}

/// Walk the blockette chain looking for blockette 1000
fn find_record_length(
    buf: &[u8],
    first: usize,
    order: ByteOrder,
) -> Result<Option<usize>, DecodeError> {
    let mut offset = first;
    let mut visited = 0;
    while offset != 0 && visited < MAX_BLOCKETTES {
        if offset < FIXED_HEADER_LEN || offset + 8 > buf.len() {
            return Ok(None);
        }
        let kind = order.u16(&buf[offset..offset + 2]);
        let next = usize::from(order.u16(&buf[offset + 2..offset + 4]));
        if kind == BLOCKETTE_1000 {
            let exponent = buf[offset + 6];
            if !(7..=16).contains(&exponent) {
                return Err(DecodeError::BadRecordLength(exponent));
            }
            return Ok(Some(1usize << exponent));
        }
        if next != 0 && next <= offset {
            return Ok(None);
        }
        offset = next;
        visited += 1;
    }
    Ok(None)
}

fn ident(field: &[u8]) -> Result<String, DecodeError> {
    if !field.iter().all(|b| b.is_ascii_graphic() || *b == b' ' || *b == 0) {
        return Err(DecodeError::BadIdentifier);
    }
    let text: String = field.iter().filter(|b| **b != 0).map(|b| char::from(*b)).collect();
    Ok(text.trim().to_owned())
}

fn btime(field: &[u8], order: ByteOrder) -> Option<DateTime<Utc>> {
    let year = order.u16(&field[0..2]);
    let day = order.u16(&field[2..4]);
    let (hour, minute, second) = (field[4], field[5], field[6]);
    let fraction = order.u16(&field[8..10]);
    if hour > 23 || minute > 59 || second > 60 || fraction > 9999 {
        return None;
    }
    let midnight = NaiveDate::from_yo_opt(i32::from(year), u32::from(day))?.and_hms_opt(0, 0, 0)?;
    let offset = TimeDelta::seconds(
        i64::from(hour) * 3600 + i64::from(minute) * 60 + i64::from(second),
    ) + TimeDelta::microseconds(i64::from(fraction) * 100);
    Some((midnight + offset).and_utc())
}

fn sample_rate(factor: i16, multiplier: i16) -> f64 {
    let f = f64::from(factor);
    let m = f64::from(multiplier);
    match (factor.signum(), multiplier.signum()) {
        (0, _) | (_, 0) => 0.0,
        (1, 1) => f * m,
        (1, _) => -f / m,
        (_, 1) => -m / f,
        _ => 1.0 / (f * m),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Pick the order in which year and day-of-year are plausible
    fn detect(year_day: &[u8]) -> Option<Self> {
        [Self::Big, Self::Little].into_iter().find(|order| {
            let year = order.u16(&year_day[0..2]);
            let day = order.u16(&year_day[2..4]);
            (1900..=2500).contains(&year) && (1..=366).contains(&day)
        })
    }

    fn u16(self, b: &[u8]) -> u16 {
        let raw = [b[0], b[1]];
        match self {
            Self::Big => u16::from_be_bytes(raw),
            Self::Little => u16::from_le_bytes(raw),
        }
    }

    fn i16(self, b: &[u8]) -> i16 {
        let raw = [b[0], b[1]];
        match self {
            Self::Big => i16::from_be_bytes(raw),
            Self::Little => i16::from_le_bytes(raw),
        }
    }

    fn i32(self, b: &[u8]) -> i32 {
        let raw = [b[0], b[1], b[2], b[3]];
        match self {
            Self::Big => i32::from_be_bytes(raw),
            Self::Little => i32::from_le_bytes(raw),
        }
    }
}

/// Record builders shared by the decoder, logger, and writer tests
#[cfg(test)]
pub(crate) mod testdata {
    /// Description of a synthetic big-endian data record
    #[derive(Clone)]
    pub(crate) struct RecordSpec {
        pub(crate) network: &'static str,
        pub(crate) station: &'static str,
        pub(crate) location: &'static str,
        pub(crate) channel: &'static str,
        pub(crate) quality: u8,
        pub(crate) year: u16,
        pub(crate) day: u16,
        pub(crate) hms: (u8, u8, u8),
        pub(crate) fraction: u16,
        pub(crate) num_samples: u16,
        pub(crate) rate_factor: i16,
        pub(crate) rate_multiplier: i16,
        pub(crate) length_exponent: u8,
    }

    impl Default for RecordSpec {
        fn default() -> Self {
            Self {
                network: "IU",
                station: "ANMO",
                location: "00",
                channel: "BHZ",
                quality: b'D',
                year: 2024,
                day: 32,
                hms: (12, 0, 0),
                fraction: 0,
                num_samples: 401,
                rate_factor: 40,
                rate_multiplier: 1,
                length_exponent: 9,
            }
        }
    }

    fn padded(value: &str, width: usize) -> Vec<u8> {
        let mut field = value.as_bytes().to_vec();
        field.resize(width, b' ');
        field
    }

    /// Build a record with blockette 1000 at offset 48
    pub(crate) fn record(spec: &RecordSpec) -> Vec<u8> {
        let length = 1usize << spec.length_exponent;
        let mut rec = Vec::with_capacity(length);
        rec.extend_from_slice(b"000001");
        rec.push(spec.quality);
        rec.push(b' ');
        rec.extend(padded(spec.station, 5));
        rec.extend(padded(spec.location, 2));
        rec.extend(padded(spec.channel, 3));
        rec.extend(padded(spec.network, 2));
        rec.extend_from_slice(&spec.year.to_be_bytes());
        rec.extend_from_slice(&spec.day.to_be_bytes());
        rec.extend_from_slice(&[spec.hms.0, spec.hms.1, spec.hms.2, 0]);
        rec.extend_from_slice(&spec.fraction.to_be_bytes());
        rec.extend_from_slice(&spec.num_samples.to_be_bytes());
        rec.extend_from_slice(&spec.rate_factor.to_be_bytes());
        rec.extend_from_slice(&spec.rate_multiplier.to_be_bytes());
        rec.extend_from_slice(&[0, 0, 0, 1]);
        rec.extend_from_slice(&0i32.to_be_bytes());
        rec.extend_from_slice(&64u16.to_be_bytes());
        rec.extend_from_slice(&48u16.to_be_bytes());
        // Blockette 1000: type, next, encoding, word order, length exponent, reserved
        rec.extend_from_slice(&1000u16.to_be_bytes());
        rec.extend_from_slice(&0u16.to_be_bytes());
        rec.extend_from_slice(&[11, 1, spec.length_exponent, 0]);
        rec.resize(length, 0);
        rec
    }

    /// Build a volume control record of the given length
    pub(crate) fn control_record(length: usize) -> Vec<u8> {
        let mut rec = b"000001V ".to_vec();
        rec.resize(length, b' ');
        rec
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::testdata::{control_record, record, RecordSpec};
    use super::*;

    #[test]
    fn decodes_big_endian_record() {
        let bytes = record(&RecordSpec::default());
        let decoded = decode(&bytes, None).unwrap();
        let SeedRecord::Data { header, length } = decoded else {
            panic!("expected data record");
        };
        assert_eq!(length, 512);
        assert_eq!(header.network, "IU");
        assert_eq!(header.station, "ANMO");
        assert_eq!(header.location, "00");
        assert_eq!(header.channel, "BHZ");
        assert_eq!(header.quality, 'D');
        assert_eq!(header.start.year(), 2024);
        assert_eq!(header.start.ordinal(), 32);
        assert_eq!(header.start.hour(), 12);
        assert!((header.sample_rate - 40.0).abs() < f64::EPSILON);
        // 401 samples at 40 Hz span exactly 10 seconds
        assert_eq!(header.last_sample_time() - header.start, TimeDelta::seconds(10));
    }

    #[test]
    fn decodes_little_endian_record() {
        let mut bytes = record(&RecordSpec::default());
        // Rewrite the multi-byte fields in little-endian order
        for range in [20..22, 22..24, 28..30, 30..32, 32..34, 34..36, 44..46, 46..48, 48..50, 50..52] {
            bytes[range].reverse();
        }
        bytes[40..44].reverse();
        let decoded = decode(&bytes, None).unwrap();
        assert_eq!(decoded.len(), 512);
        let SeedRecord::Data { header, .. } = decoded else {
            panic!("expected data record");
        };
        assert_eq!(header.start.year(), 2024);
        assert_eq!(header.num_samples, 401);
    }

    #[test]
    fn blank_location_is_trimmed() {
        let bytes = record(&RecordSpec {
            location: "",
            ..RecordSpec::default()
        });
        let SeedRecord::Data { header, .. } = decode(&bytes, None).unwrap() else {
            panic!("expected data record");
        };
        assert_eq!(header.location, "");
    }

    #[test]
    fn truncated_record_is_reported() {
        let bytes = record(&RecordSpec::default());
        assert_eq!(
            decode(&bytes[..300], None),
            Err(DecodeError::Truncated {
                needed: 512,
                available: 300
            })
        );
        assert!(matches!(
            decode(&bytes[..20], None),
            Err(DecodeError::Truncated { needed: 48, .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(decode(&[0xFF; 600], None), Err(DecodeError::BadSequence));

        let mut bytes = record(&RecordSpec::default());
        bytes[6] = b'X';
        assert_eq!(decode(&bytes, None), Err(DecodeError::BadIndicator(b'X')));

        let mut bytes = record(&RecordSpec::default());
        bytes[21] = 0xFF;
        bytes[20] = 0xFF;
        assert_eq!(decode(&bytes, None), Err(DecodeError::BadStartTime));
    }

    #[test]
    fn missing_blockette_uses_default_length() {
        let mut bytes = record(&RecordSpec {
            length_exponent: 12,
            ..RecordSpec::default()
        });
        bytes[46..48].copy_from_slice(&0u16.to_be_bytes());
        assert_eq!(decode(&bytes, None), Err(DecodeError::MissingRecordLength));
        assert_eq!(decode(&bytes, Some(DEFAULT_RECORD_LEN)).unwrap().len(), 4096);
    }

    #[test]
    fn control_records_are_recognised() {
        let bytes = control_record(4096);
        assert_eq!(
            decode(&bytes, Some(DEFAULT_RECORD_LEN)),
            Ok(SeedRecord::Control { length: 4096 })
        );
    }

    #[test]
    fn sample_rate_rules() {
        assert!((sample_rate(40, 1) - 40.0).abs() < f64::EPSILON);
        assert!((sample_rate(1, -10) - 0.1).abs() < f64::EPSILON);
        assert!((sample_rate(-10, 1) - 0.1).abs() < f64::EPSILON);
        assert!((sample_rate(-10, -10) - 0.01).abs() < f64::EPSILON);
        assert!(sample_rate(0, 1).abs() < f64::EPSILON);
    }

    #[test]
    fn fraction_is_ten_thousandths() {
        let bytes = record(&RecordSpec {
            fraction: 5000,
            ..RecordSpec::default()
        });
        let SeedRecord::Data { header, .. } = decode(&bytes, None).unwrap() else {
            panic!("expected data record");
        };
        assert_eq!(header.start.nanosecond(), 500_000_000);
    }
}
