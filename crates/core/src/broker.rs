//! Broker-session collaborator seam.
//!
//! The message broker wire protocol is out of scope for this crate; an MQTT
//! client (or any other pub/sub transport) is plugged in behind
//! [`BrokerSession`]. The session controller owns the implementation
//! exclusively and drives it from a single task, so methods take `&mut self`
//! and no internal synchronization is required.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Ephemeral broker credentials issued by the Topic Authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Failure reported by a broker session.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BrokerError(pub String);

impl BrokerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Push events delivered by a broker session after `connect`.
#[derive(Debug)]
pub enum BrokerEvent {
    /// A message arrived on a subscribed topic, or a publish was confirmed
    /// with its payload echoed back.
    Message(Vec<u8>),
    /// The connection was closed, with the transport error if it was not a
    /// requested disconnect.
    Disconnected(Option<BrokerError>),
}

/// Connection to the pub/sub transport, supplied by the caller.
///
/// `connect` hands the implementation a channel for push events; every
/// reconnect passes a fresh channel, so implementations must drop the old
/// sender when `connect` is called again. A `disconnect` request must be
/// confirmed with a [`BrokerEvent::Disconnected`] event once the transport
/// has actually closed.
#[async_trait]
pub trait BrokerSession: Send + 'static {
    /// Opens the connection using the given credentials.
    async fn connect(
        &mut self,
        credentials: &Credentials,
        events: mpsc::UnboundedSender<BrokerEvent>,
    ) -> Result<(), BrokerError>;

    /// Subscribes to a session topic.
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    /// Publishes a payload on a session topic. Fire-and-forget: the SDK
    /// never retries an individual publish.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Requests a disconnect; confirmation arrives as an event.
    async fn disconnect(&mut self);
}
