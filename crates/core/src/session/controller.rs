//! Controller task owning all session state.
//!
//! One task per session. Commands from the facade and completions from the
//! bootstrap client, the broker, and the position source all arrive over
//! channels, so every mutation happens in one sequential context without
//! locking. Completions are tagged with the episode counter current when
//! their work was spawned; anything tagged with an older episode is dropped
//! on arrival, which is what makes `stop()` and rapid restarts safe against
//! late callbacks.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use livetrack_protocol::Role;

use crate::bootstrap::{BootstrapClient, TopicGrant};
use crate::broker::{BrokerEvent, BrokerSession};
use crate::codec;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::freshness::FreshnessValidator;
use crate::location::{PositionEvent, PositionSource};
use crate::retry::{RetryDecision, RetryPolicy};

use super::events::TrackerEvent;
use super::state::{SessionState, Status};

const TARGET: &str = "livetrack.session";

/// Commands from the facade, each answered over a oneshot.
pub(super) enum Command {
    Start {
        tracking_identifier: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Restart {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<Status>,
    },
}

/// Completions funneled into the controller, tagged with the episode they
/// belong to.
enum FlowEvent {
    Bootstrap { epoch: u64, result: Result<TopicGrant> },
    Broker { epoch: u64, event: BrokerEvent },
    Position { epoch: u64, event: PositionEvent },
}

#[derive(Debug, Clone, Copy)]
enum RetryKind {
    /// Re-request a topic grant.
    Bootstrap,
    /// Reconnect with the grant already held.
    Reconnect,
}

struct PendingRetry {
    kind: RetryKind,
    deadline: Instant,
}

enum Step {
    Command(Command),
    Flow(FlowEvent),
    RetryDue,
    Shutdown,
}

/// Spawns a controller task and returns its command sender and the caller
/// event receiver.
pub(super) fn spawn(
    role: Role,
    config: Arc<ServiceConfig>,
    bootstrap: Arc<dyn BootstrapClient>,
    broker: Box<dyn BrokerSession>,
    position: Option<Box<dyn PositionSource>>,
) -> (
    mpsc::UnboundedSender<Command>,
    mpsc::UnboundedReceiver<TrackerEvent>,
) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (flow_tx, flow_rx) = mpsc::unbounded_channel();

    let controller = Controller {
        role,
        retry: RetryPolicy::new(config.max_retries, config.retry_delay),
        config,
        bootstrap,
        broker,
        position,
        session: SessionState::new(),
        freshness: FreshnessValidator::new(),
        events: event_tx,
        commands: command_rx,
        flow_tx,
        flow_rx,
        pending_retry: None,
        epoch: 0,
        broker_connected: false,
    };
    tokio::spawn(controller.run());

    (command_tx, event_rx)
}

struct Controller {
    role: Role,
    config: Arc<ServiceConfig>,
    bootstrap: Arc<dyn BootstrapClient>,
    broker: Box<dyn BrokerSession>,
    position: Option<Box<dyn PositionSource>>,
    session: SessionState,
    retry: RetryPolicy,
    freshness: FreshnessValidator,
    events: mpsc::UnboundedSender<TrackerEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Kept alive here so `flow_rx` never reports closed.
    flow_tx: mpsc::UnboundedSender<FlowEvent>,
    flow_rx: mpsc::UnboundedReceiver<FlowEvent>,
    pending_retry: Option<PendingRetry>,
    /// Episode counter; bumped on every transition into `Starting` and on
    /// every stop so late completions from a previous episode are ignored.
    epoch: u64,
    broker_connected: bool,
}

impl Controller {
    async fn run(mut self) {
        loop {
            match self.next_step().await {
                Step::Command(command) => self.handle_command(command).await,
                Step::Flow(flow) => self.handle_flow(flow).await,
                Step::RetryDue => self.handle_retry_due().await,
                Step::Shutdown => break,
            }
        }
        debug!(target = TARGET, "all facades dropped; controller exiting");
    }

    async fn next_step(&mut self) -> Step {
        let deadline = self.pending_retry.as_ref().map(|p| p.deadline);
        tokio::select! {
            command = self.commands.recv() => match command {
                Some(command) => Step::Command(command),
                None => Step::Shutdown,
            },
            Some(flow) = self.flow_rx.recv() => Step::Flow(flow),
            _ = sleep_until_opt(deadline), if deadline.is_some() => Step::RetryDue,
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start {
                tracking_identifier,
                reply,
            } => {
                let _ = reply.send(self.handle_start(tracking_identifier));
            }
            Command::Restart { reply } => {
                let _ = reply.send(self.handle_restart().await);
            }
            Command::Stop { reply } => {
                self.handle_stop().await;
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.session.status);
            }
        }
    }

    fn handle_start(&mut self, tracking_identifier: String) -> Result<()> {
        if matches!(self.session.status, Status::Starting | Status::Running) {
            return Err(Error::ServiceCurrentlyRunning);
        }
        if !self.config.is_authenticated() {
            return Err(Error::AccessTokenNotAvailable);
        }

        info!(target = TARGET, track_id = %tracking_identifier, role = %self.role, "starting session");
        self.begin_episode();
        self.session.tracking_identifier = Some(tracking_identifier);
        self.session.topic = None;
        self.session.credentials = None;
        self.spawn_bootstrap();
        Ok(())
    }

    async fn handle_restart(&mut self) -> Result<()> {
        if self.session.tracking_identifier.is_none() {
            return Err(Error::TrackingIdentifierNotAvailable);
        }
        if matches!(self.session.status, Status::Starting | Status::Running) {
            return Err(Error::ServiceCurrentlyRunning);
        }

        info!(target = TARGET, role = %self.role, "restarting session");
        self.begin_episode();
        if self.session.topic.is_some() && self.session.credentials.is_some() {
            debug!(target = TARGET, "reusing stored topic grant");
            self.open_broker().await;
        } else {
            self.spawn_bootstrap();
        }
        Ok(())
    }

    async fn handle_stop(&mut self) {
        if self.session.status == Status::Stopped {
            return;
        }

        debug!(target = TARGET, "stop requested");
        self.pending_retry = None;
        if let Some(source) = self.position.as_mut() {
            source.stop_tracking();
        }
        self.retry.reset();
        self.session.status = Status::Stopped;

        if self.broker_connected {
            // The Stopped event fires once the broker confirms with a
            // Disconnected event for this episode.
            self.session.expected_disconnect = true;
            self.broker.disconnect().await;
        } else {
            self.epoch += 1;
            self.emit(TrackerEvent::Stopped(None));
        }
    }

    async fn handle_flow(&mut self, flow: FlowEvent) {
        match flow {
            FlowEvent::Bootstrap { epoch, result } => self.on_bootstrap(epoch, result).await,
            FlowEvent::Broker { epoch, event } => match event {
                BrokerEvent::Message(payload) => self.on_broker_message(epoch, payload),
                BrokerEvent::Disconnected(error) => {
                    self.on_broker_disconnected(epoch, error).await;
                }
            },
            FlowEvent::Position { epoch, event } => self.on_position_event(epoch, event).await,
        }
    }

    async fn handle_retry_due(&mut self) {
        let Some(pending) = self.pending_retry.take() else {
            return;
        };
        match pending.kind {
            RetryKind::Bootstrap => {
                debug!(target = TARGET, attempt = self.retry.attempts(), "retrying bootstrap");
                self.spawn_bootstrap();
            }
            RetryKind::Reconnect => {
                debug!(target = TARGET, attempt = self.retry.attempts(), "reconnecting to broker");
                self.open_broker().await;
            }
        }
    }

    /// Transitions into `Starting` for a fresh episode.
    ///
    /// A start issued while a disconnect confirmation is still in flight
    /// supersedes the stopping episode: the confirmation arrives with a
    /// stale epoch and its `Stopped(None)` event is never emitted.
    fn begin_episode(&mut self) {
        if self.session.expected_disconnect {
            debug!(target = TARGET, "discarding pending disconnect confirmation");
        }
        self.epoch += 1;
        self.session.expected_disconnect = false;
        self.pending_retry = None;
        self.retry.reset();
        self.freshness.reset();
        self.session.status = Status::Starting;
    }

    fn spawn_bootstrap(&mut self) {
        // Callers guarantee an identifier is set before bootstrapping.
        let Some(track_id) = self.session.tracking_identifier.clone() else {
            return;
        };
        let bootstrap = Arc::clone(&self.bootstrap);
        let role = self.role;
        let epoch = self.epoch;
        let flow_tx = self.flow_tx.clone();
        tokio::spawn(async move {
            let result = bootstrap.issue(&track_id, role).await;
            let _ = flow_tx.send(FlowEvent::Bootstrap { epoch, result });
        });
    }

    async fn on_bootstrap(&mut self, epoch: u64, result: Result<TopicGrant>) {
        if epoch != self.epoch || self.session.status != Status::Starting {
            debug!(target = TARGET, "dropping stale bootstrap completion");
            return;
        }

        match result {
            Ok(grant) => {
                debug!(target = TARGET, topic = %grant.topic, "topic grant issued");
                self.session.topic = Some(grant.topic);
                self.session.credentials = Some(grant.credentials);
                self.retry.reset();
                self.open_broker().await;
            }
            Err(error) if error.is_retryable() => match self.retry.next_attempt() {
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        target = TARGET,
                        %error,
                        attempt = self.retry.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "bootstrap failed; will retry"
                    );
                    self.schedule_retry(RetryKind::Bootstrap, delay);
                }
                RetryDecision::GiveUp => {
                    warn!(target = TARGET, %error, "bootstrap retry budget exhausted");
                    self.terminal_stop(Some(error)).await;
                }
            },
            Err(error) => {
                warn!(target = TARGET, %error, "bootstrap failed terminally");
                self.terminal_stop(Some(error)).await;
            }
        }
    }

    /// Connects the broker using the stored grant, then brings up the
    /// role-specific data path. Connect and subscribe failures burn retry
    /// budget but reuse the grant; they never re-run bootstrap.
    async fn open_broker(&mut self) {
        let (Some(topic), Some(credentials)) =
            (self.session.topic.clone(), self.session.credentials.clone())
        else {
            // Grant lost (e.g. a stop raced in); fall back to bootstrap.
            self.spawn_bootstrap();
            return;
        };

        let (broker_tx, broker_rx) = mpsc::unbounded_channel();
        if let Err(error) = self.broker.connect(&credentials, broker_tx).await {
            self.on_connect_failure(Error::Broker(error.to_string())).await;
            return;
        }
        self.broker_connected = true;
        self.forward_broker(broker_rx);
        debug!(target = TARGET, topic = %topic, "broker connected");

        match self.role {
            Role::Publisher => match self.start_position_source() {
                Ok(()) => self.mark_running(),
                Err(error) => {
                    warn!(target = TARGET, %error, "position source refused to start");
                    self.terminal_stop(Some(error)).await;
                }
            },
            Role::Subscriber => match self.broker.subscribe(&topic).await {
                Ok(()) => self.mark_running(),
                Err(error) => {
                    self.on_connect_failure(Error::Broker(error.to_string())).await;
                }
            },
        }
    }

    async fn on_connect_failure(&mut self, error: Error) {
        match self.retry.next_attempt() {
            RetryDecision::RetryAfter(delay) => {
                debug!(
                    target = TARGET,
                    %error,
                    attempt = self.retry.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "broker connection failed; will retry"
                );
                self.schedule_retry(RetryKind::Reconnect, delay);
            }
            RetryDecision::GiveUp => {
                warn!(target = TARGET, %error, "broker retry budget exhausted");
                self.terminal_stop(Some(error)).await;
            }
        }
    }

    fn start_position_source(&mut self) -> Result<()> {
        let Some(source) = self.position.as_mut() else {
            return Err(Error::Permission("no position source configured".into()));
        };
        let (position_tx, position_rx) = mpsc::unbounded_channel();
        source
            .start_tracking(position_tx)
            .map_err(|e| Error::Permission(e.to_string()))?;
        self.forward_position(position_rx);
        Ok(())
    }

    fn mark_running(&mut self) {
        self.retry.reset();
        self.session.status = Status::Running;
        info!(target = TARGET, role = %self.role, "session running");
    }

    fn on_broker_message(&mut self, epoch: u64, payload: Vec<u8>) {
        if epoch != self.epoch || self.session.status != Status::Running {
            return;
        }

        match codec::decode(&payload) {
            Ok(sample) => match self.role {
                Role::Publisher => self.emit(TrackerEvent::Published(sample)),
                Role::Subscriber => {
                    match self.freshness.check(sample.timestamp, Utc::now()) {
                        Ok(()) => self.emit(TrackerEvent::LocationReceived(sample)),
                        Err(rejection) => {
                            debug!(target = TARGET, ?rejection, "dropping stale sample");
                        }
                    }
                }
            },
            Err(error) => {
                debug!(target = TARGET, %error, "undecodable broker message");
                self.emit(TrackerEvent::Failed(Error::Codec(error)));
            }
        }
    }

    async fn on_broker_disconnected(&mut self, epoch: u64, error: Option<crate::broker::BrokerError>) {
        if epoch != self.epoch {
            debug!(target = TARGET, "dropping stale disconnect");
            return;
        }
        self.broker_connected = false;

        if self.session.expected_disconnect {
            self.session.expected_disconnect = false;
            self.epoch += 1;
            debug!(target = TARGET, "disconnect confirmed");
            self.emit(TrackerEvent::Stopped(None));
            return;
        }
        if self.session.status == Status::Stopped {
            return;
        }

        let error = error.map(|e| Error::Broker(e.to_string()));
        match self.retry.next_attempt() {
            RetryDecision::RetryAfter(delay) => {
                debug!(
                    target = TARGET,
                    attempt = self.retry.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "connection lost; will reconnect"
                );
                self.schedule_retry(RetryKind::Reconnect, delay);
            }
            RetryDecision::GiveUp => {
                warn!(target = TARGET, "connection lost; retry budget exhausted");
                self.terminal_stop(error.or_else(|| Some(Error::Broker("connection lost".into()))))
                    .await;
            }
        }
    }

    async fn on_position_event(&mut self, epoch: u64, event: PositionEvent) {
        if epoch != self.epoch {
            return;
        }
        match event {
            PositionEvent::Update(sample) => {
                if self.session.status != Status::Running || !self.broker_connected {
                    debug!(target = TARGET, "dropping sample; session not running");
                    return;
                }
                let Some(topic) = self.session.topic.clone() else {
                    return;
                };
                match codec::encode(&sample) {
                    Ok(payload) => {
                        if let Err(error) = self.broker.publish(&topic, payload).await {
                            // A failed publish means the connection is on its
                            // way down; the broker's own Disconnected event
                            // drives recovery.
                            warn!(target = TARGET, %error, "publish failed");
                        }
                    }
                    Err(error) => self.emit(TrackerEvent::Failed(Error::Codec(error))),
                }
            }
            PositionEvent::Failure(error) => {
                warn!(target = TARGET, %error, "position source failed");
                self.terminal_stop(Some(Error::Permission(error.to_string()))).await;
            }
        }
    }

    /// Stops the session because of a failure, emitting exactly one
    /// `Stopped` event for the episode.
    async fn terminal_stop(&mut self, error: Option<Error>) {
        if self.session.status == Status::Stopped {
            return;
        }
        self.pending_retry = None;
        if let Some(source) = self.position.as_mut() {
            source.stop_tracking();
        }
        if self.broker_connected {
            self.broker.disconnect().await;
            self.broker_connected = false;
        }
        self.retry.reset();
        self.session.expected_disconnect = false;
        self.session.status = Status::Stopped;
        self.epoch += 1;
        self.emit(TrackerEvent::Stopped(error));
    }

    fn schedule_retry(&mut self, kind: RetryKind, delay: std::time::Duration) {
        self.pending_retry = Some(PendingRetry {
            kind,
            deadline: Instant::now() + delay,
        });
    }

    /// Pumps broker events for the current episode into the flow channel.
    fn forward_broker(&self, mut broker_rx: mpsc::UnboundedReceiver<BrokerEvent>) {
        let flow_tx = self.flow_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            while let Some(event) = broker_rx.recv().await {
                if flow_tx.send(FlowEvent::Broker { epoch, event }).is_err() {
                    break;
                }
            }
        });
    }

    fn forward_position(&self, mut position_rx: mpsc::UnboundedReceiver<PositionEvent>) {
        let flow_tx = self.flow_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            while let Some(event) = position_rx.recv().await {
                if flow_tx.send(FlowEvent::Position { epoch, event }).is_err() {
                    break;
                }
            }
        });
    }

    fn emit(&self, event: TrackerEvent) {
        // The caller may have dropped the receiver; that is not an error.
        let _ = self.events.send(event);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
