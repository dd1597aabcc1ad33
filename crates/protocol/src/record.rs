//! Location record as carried on the broker topic.

use serde::{Deserialize, Serialize};

/// Current version of the location wire record.
///
/// Encoders always stamp this value; decoders reject records carrying any
/// other version instead of guessing at field semantics.
pub const WIRE_VERSION: u8 = 1;

/// One location sample as published on a session topic.
///
/// Serialized as JSON:
/// ```json
/// {
///   "v": 1,
///   "location": [51.4, 35.7],
///   "direction": 10.0,
///   "speed": 2.5,
///   "rtimestamp": "2024-05-01T12:30:00.000Z"
/// }
/// ```
///
/// `location` is ordered `[longitude, latitude]`, not `[lat, lon]`.
/// `rtimestamp` is RFC 3339 UTC with millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRecord {
    /// Wire format version; see [`WIRE_VERSION`].
    #[serde(rename = "v")]
    pub version: u8,
    /// `[longitude, latitude]` pair in degrees.
    pub location: [f64; 2],
    /// Course over ground in degrees.
    pub direction: f32,
    /// Speed in meters per second.
    pub speed: f64,
    /// RFC 3339 timestamp of the sample.
    pub rtimestamp: String,
}
