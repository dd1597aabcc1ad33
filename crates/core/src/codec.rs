//! Encoding and decoding of location samples to the wire record.
//!
//! Pure and stateless. The wire format is versioned JSON (see
//! [`livetrack_protocol::record`]); timestamps travel as RFC 3339 UTC with
//! millisecond precision.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use livetrack_protocol::{WireRecord, WIRE_VERSION};

use crate::location::LocationSample;

/// Failure to encode or decode a wire record.
///
/// Never fatal to a session; decode failures surface as per-message
/// `Failed` events.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload is not a valid wire record.
    #[error("malformed wire record: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The record carries a version this build does not understand.
    #[error("unsupported wire record version {0}")]
    UnsupportedVersion(u8),

    /// The record timestamp is not valid RFC 3339.
    #[error("invalid wire timestamp {0:?}")]
    Timestamp(String),
}

/// Encodes a sample into wire record bytes.
///
/// `location` is written `[longitude, latitude]`.
pub fn encode(sample: &LocationSample) -> Result<Vec<u8>, CodecError> {
    let record = WireRecord {
        version: WIRE_VERSION,
        location: [sample.longitude, sample.latitude],
        direction: sample.course,
        speed: sample.speed,
        rtimestamp: sample
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    };
    Ok(serde_json::to_vec(&record)?)
}

/// Decodes wire record bytes back into a sample.
pub fn decode(payload: &[u8]) -> Result<LocationSample, CodecError> {
    let record: WireRecord = serde_json::from_slice(payload)?;
    if record.version != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(record.version));
    }

    let timestamp = DateTime::parse_from_rfc3339(&record.rtimestamp)
        .map_err(|_| CodecError::Timestamp(record.rtimestamp.clone()))?
        .with_timezone(&Utc);

    Ok(LocationSample {
        longitude: record.location[0],
        latitude: record.location[1],
        course: record.direction,
        speed: record.speed,
        timestamp,
    })
}
