//! Publisher and subscriber facades.
//!
//! Each facade owns only a command sender; the controller task spawned at
//! construction owns everything else. Dropping the last facade clone closes
//! the command channel and lets the controller exit.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use livetrack_protocol::Role;

use crate::bootstrap::{BootstrapClient, TopicBootstrapClient};
use crate::broker::BrokerSession;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::location::PositionSource;

use super::controller::{self, Command};
use super::events::TrackerEvent;
use super::state::Status;

/// Receiver half of the session event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<TrackerEvent>;

#[derive(Clone)]
struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    async fn start(&self, tracking_identifier: &str) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Start {
                tracking_identifier: tracking_identifier.to_string(),
                reply,
            })
            .map_err(|_| Error::ChannelClosed)?;
        response.await.map_err(|_| Error::ChannelClosed)?
    }

    async fn restart(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Restart { reply })
            .map_err(|_| Error::ChannelClosed)?;
        response.await.map_err(|_| Error::ChannelClosed)?
    }

    async fn stop(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stop { reply })
            .map_err(|_| Error::ChannelClosed)?;
        response.await.map_err(|_| Error::ChannelClosed)
    }

    async fn status(&self) -> Result<Status> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Status { reply })
            .map_err(|_| Error::ChannelClosed)?;
        response.await.map_err(|_| Error::ChannelClosed)
    }
}

/// Publishes location samples from a position source to a per-session topic.
///
/// Construction spawns the controller task and returns the event receiver
/// alongside the facade. The session does not start until [`start`] is
/// called with a tracking identifier.
///
/// [`start`]: Publisher::start
#[derive(Clone)]
pub struct Publisher {
    handle: SessionHandle,
}

impl Publisher {
    /// Creates a publisher using the REST Topic Authority client.
    pub fn new(
        config: ServiceConfig,
        broker: Box<dyn BrokerSession>,
        position: Box<dyn PositionSource>,
    ) -> Result<(Self, EventReceiver)> {
        let config = Arc::new(config);
        let bootstrap = Arc::new(TopicBootstrapClient::new(Arc::clone(&config))?);
        Ok(Self::spawn(config, bootstrap, broker, position))
    }

    /// Creates a publisher with a custom bootstrap client. Tests use this to
    /// plug in [`testing::FakeBootstrap`](crate::testing::FakeBootstrap).
    pub fn with_bootstrap(
        config: ServiceConfig,
        bootstrap: Arc<dyn BootstrapClient>,
        broker: Box<dyn BrokerSession>,
        position: Box<dyn PositionSource>,
    ) -> (Self, EventReceiver) {
        Self::spawn(Arc::new(config), bootstrap, broker, position)
    }

    fn spawn(
        config: Arc<ServiceConfig>,
        bootstrap: Arc<dyn BootstrapClient>,
        broker: Box<dyn BrokerSession>,
        position: Box<dyn PositionSource>,
    ) -> (Self, EventReceiver) {
        let (commands, events) =
            controller::spawn(Role::Publisher, config, bootstrap, broker, Some(position));
        (
            Self {
                handle: SessionHandle { commands },
            },
            events,
        )
    }

    /// Starts publishing under the given tracking identifier.
    ///
    /// Returns [`Error::ServiceCurrentlyRunning`] while a session is
    /// starting or running, and [`Error::AccessTokenNotAvailable`] when the
    /// configured access token is blank. Failures after this call returns
    /// surface as [`TrackerEvent`]s.
    pub async fn start(&self, tracking_identifier: &str) -> Result<()> {
        self.handle.start(tracking_identifier).await
    }

    /// Restarts a stopped session, reusing the stored topic grant when one
    /// is held. Fails with [`Error::TrackingIdentifierNotAvailable`] when
    /// [`start`](Publisher::start) has never succeeded.
    pub async fn restart(&self) -> Result<()> {
        self.handle.restart().await
    }

    /// Stops the session. Idempotent; a no-op when already stopped.
    pub async fn stop(&self) -> Result<()> {
        self.handle.stop().await
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> Result<Status> {
        self.handle.status().await
    }
}

/// Receives location samples published under a tracking identifier.
///
/// Mirrors [`Publisher`] but subscribes to the granted topic instead of
/// publishing to it, and filters received samples for freshness before
/// delivering them as [`TrackerEvent::LocationReceived`].
#[derive(Clone)]
pub struct Subscriber {
    handle: SessionHandle,
}

impl Subscriber {
    /// Creates a subscriber using the REST Topic Authority client.
    pub fn new(
        config: ServiceConfig,
        broker: Box<dyn BrokerSession>,
    ) -> Result<(Self, EventReceiver)> {
        let config = Arc::new(config);
        let bootstrap = Arc::new(TopicBootstrapClient::new(Arc::clone(&config))?);
        Ok(Self::spawn(config, bootstrap, broker))
    }

    /// Creates a subscriber with a custom bootstrap client.
    pub fn with_bootstrap(
        config: ServiceConfig,
        bootstrap: Arc<dyn BootstrapClient>,
        broker: Box<dyn BrokerSession>,
    ) -> (Self, EventReceiver) {
        Self::spawn(Arc::new(config), bootstrap, broker)
    }

    fn spawn(
        config: Arc<ServiceConfig>,
        bootstrap: Arc<dyn BootstrapClient>,
        broker: Box<dyn BrokerSession>,
    ) -> (Self, EventReceiver) {
        let (commands, events) =
            controller::spawn(Role::Subscriber, config, bootstrap, broker, None);
        (
            Self {
                handle: SessionHandle { commands },
            },
            events,
        )
    }

    /// Starts receiving samples for the given tracking identifier.
    pub async fn start(&self, tracking_identifier: &str) -> Result<()> {
        self.handle.start(tracking_identifier).await
    }

    /// Restarts a stopped session, reusing the stored topic grant when one
    /// is held.
    pub async fn restart(&self) -> Result<()> {
        self.handle.restart().await
    }

    /// Stops the session. Idempotent; a no-op when already stopped.
    pub async fn stop(&self) -> Result<()> {
        self.handle.stop().await
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> Result<Status> {
        self.handle.status().await
    }
}
