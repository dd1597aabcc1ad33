//! Error taxonomy for the tracking session layer.
//!
//! Variants split into three families the session controller treats
//! differently:
//! * terminal, never retried: [`Error::AccessTokenNotAvailable`],
//!   [`Error::Unauthorized`], [`Error::ServiceUnavailable`],
//!   [`Error::Permission`]
//! * retryable up to the configured bound: [`Error::Transient`],
//!   [`Error::Broker`]
//! * non-fatal, reported per message: [`Error::Codec`]

use thiserror::Error as ThisError;

use crate::codec::CodecError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by publishers and subscribers.
#[derive(Debug, ThisError)]
pub enum Error {
    /// No access token was configured; the service cannot start.
    #[error("access token is not available; configure one before starting")]
    AccessTokenNotAvailable,

    /// The Topic Authority rejected the configured access token.
    #[error("access token was rejected by the tracking service")]
    Unauthorized,

    /// The Topic Authority refused to issue a topic.
    #[error("tracking service is not available: {0}")]
    ServiceUnavailable(String),

    /// `start` was called while the session is starting or running.
    #[error("service is currently running or starting")]
    ServiceCurrentlyRunning,

    /// `restart` was called before any `start` set an identifier.
    #[error("tracking identifier is not available; call start first")]
    TrackingIdentifierNotAvailable,

    /// A network-level failure that may succeed on retry.
    #[error("transient network failure: {0}")]
    Transient(String),

    /// The broker connection failed or was lost.
    #[error("broker session failure: {0}")]
    Broker(String),

    /// A location record could not be encoded or decoded.
    ///
    /// Non-fatal: the session keeps running and the error is reported
    /// through a `Failed` event.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The position source is not permitted to deliver locations.
    #[error("location permission denied: {0}")]
    Permission(String),

    /// The session task is gone; the controlling handle was used after drop.
    #[error("session task is no longer running")]
    ChannelClosed,
}

impl Error {
    /// Whether the failure may be retried under the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Broker(_))
    }
}
