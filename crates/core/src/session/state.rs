//! Session status and state record owned by the controller task.

use crate::broker::Credentials;

/// Lifecycle status of a publisher or subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Constructed and ready to start.
    Initiated,
    /// Bootstrapping credentials or connecting to the broker.
    Starting,
    /// Connected; telemetry is flowing.
    Running,
    /// Stopped by the caller or by a terminal failure. Re-enterable via
    /// `start`/`restart`.
    Stopped,
}

/// Mutable session record.
///
/// Owned exclusively by one controller task; never shared or locked.
/// `tracking_identifier` survives `stop()` so `restart()` can reuse it;
/// `topic`/`credentials` are only meaningful while running or freshly set
/// during a `Starting` transition.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) tracking_identifier: Option<String>,
    pub(crate) topic: Option<String>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) status: Status,
    /// Single-flight guard distinguishing a requested disconnect from a
    /// connection loss.
    pub(crate) expected_disconnect: bool,
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self {
            tracking_identifier: None,
            topic: None,
            credentials: None,
            status: Status::Initiated,
            expected_disconnect: false,
        }
    }
}
