//! Location samples and the position-source collaborator seam.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

/// One position sample, as produced by a position source or decoded from a
/// wire record.
///
/// Altitude and accuracy are not part of the tracking protocol and are not
/// carried here.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Course over ground in degrees.
    pub course: f32,
    /// Speed in meters per second.
    pub speed: f64,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

/// Failure raised by a position source.
///
/// Typically a missing or insufficient location permission; always terminal
/// for the session.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PositionError(pub String);

impl PositionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Push events delivered by a position source while tracking.
#[derive(Debug)]
pub enum PositionEvent {
    /// A new position sample is available.
    Update(LocationSample),
    /// Position delivery failed; the session stops.
    Failure(PositionError),
}

/// Device position sampling, supplied by the caller (publisher only).
///
/// Implementations deliver updates through the channel handed to
/// [`start_tracking`](PositionSource::start_tracking) until
/// [`stop_tracking`](PositionSource::stop_tracking) is called. The SDK may
/// call `start_tracking` again after a broker reconnect; implementations
/// should replace the previous channel in that case.
pub trait PositionSource: Send + 'static {
    /// Begins delivering position updates.
    ///
    /// Fails when the process lacks location permission.
    fn start_tracking(
        &mut self,
        updates: mpsc::UnboundedSender<PositionEvent>,
    ) -> Result<(), PositionError>;

    /// Stops delivering position updates.
    fn stop_tracking(&mut self);
}
