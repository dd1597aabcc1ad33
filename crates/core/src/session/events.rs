//! Events delivered to the caller over the session event channel.

use crate::error::Error;
use crate::location::LocationSample;

/// Caller-visible session events.
///
/// Delivered over the unbounded receiver returned by the facade
/// constructors. `Stopped` is terminal for the current episode and is
/// emitted exactly once per stop, whether requested or caused by a failure;
/// `Failed` is informational and does not end the session.
#[derive(Debug)]
pub enum TrackerEvent {
    /// A sample arrived on the subscribed topic and passed freshness
    /// validation (subscriber only).
    LocationReceived(LocationSample),
    /// The broker confirmed a publish; carries the decoded echo
    /// (publisher only).
    Published(LocationSample),
    /// A non-fatal, per-message failure; the session keeps running.
    Failed(Error),
    /// The session stopped: `None` after a requested stop, `Some` after a
    /// terminal failure.
    Stopped(Option<Error>),
}
