//! In-memory fakes for the session's collaborators.
//!
//! Each fake splits into the object handed to the session and a controller
//! kept by the test. The controller injects failures and inbound traffic
//! and inspects what the session did, over shared state guarded by
//! [`parking_lot::Mutex`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use livetrack_protocol::Role;

use crate::bootstrap::{BootstrapClient, TopicGrant};
use crate::broker::{BrokerError, BrokerEvent, BrokerSession, Credentials};
use crate::error::{Error, Result};
use crate::location::{LocationSample, PositionError, PositionEvent, PositionSource};

// ---------------------------------------------------------------------------
// Broker

#[derive(Default)]
struct BrokerShared {
    connect_failures: Mutex<VecDeque<BrokerError>>,
    subscribe_failures: Mutex<VecDeque<BrokerError>>,
    publish_failures: Mutex<VecDeque<BrokerError>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscriptions: Mutex<Vec<String>>,
    credentials: Mutex<Option<Credentials>>,
    events: Mutex<Option<mpsc::UnboundedSender<BrokerEvent>>>,
    hold_disconnects: AtomicBool,
    held_disconnects: Mutex<Vec<mpsc::UnboundedSender<BrokerEvent>>>,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
}

/// Broker fake handed to the session.
pub struct FakeBroker {
    shared: Arc<BrokerShared>,
}

/// Test-side controller for a [`FakeBroker`].
#[derive(Clone)]
pub struct FakeBrokerController {
    shared: Arc<BrokerShared>,
}

impl FakeBroker {
    pub fn new() -> (Self, FakeBrokerController) {
        let shared = Arc::new(BrokerShared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            FakeBrokerController { shared },
        )
    }
}

#[async_trait]
impl BrokerSession for FakeBroker {
    async fn connect(
        &mut self,
        credentials: &Credentials,
        events: mpsc::UnboundedSender<BrokerEvent>,
    ) -> std::result::Result<(), BrokerError> {
        self.shared.connect_calls.fetch_add(1, Ordering::SeqCst);
        *self.shared.credentials.lock() = Some(credentials.clone());
        if let Some(error) = self.shared.connect_failures.lock().pop_front() {
            return Err(error);
        }
        *self.shared.events.lock() = Some(events);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> std::result::Result<(), BrokerError> {
        if let Some(error) = self.shared.subscribe_failures.lock().pop_front() {
            return Err(error);
        }
        self.shared.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
    ) -> std::result::Result<(), BrokerError> {
        if let Some(error) = self.shared.publish_failures.lock().pop_front() {
            return Err(error);
        }
        self.shared.published.lock().push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.shared.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        // Confirm the disconnect the way a real broker client would, with a
        // clean Disconnected event.
        if let Some(events) = self.shared.events.lock().take() {
            if self.shared.hold_disconnects.load(Ordering::SeqCst) {
                self.shared.held_disconnects.lock().push(events);
            } else {
                let _ = events.send(BrokerEvent::Disconnected(None));
            }
        }
    }
}

impl FakeBrokerController {
    /// Makes the next `connect` call fail.
    pub fn queue_connect_failure(&self, message: &str) {
        self.shared
            .connect_failures
            .lock()
            .push_back(BrokerError::new(message));
    }

    /// Makes the next `subscribe` call fail.
    pub fn queue_subscribe_failure(&self, message: &str) {
        self.shared
            .subscribe_failures
            .lock()
            .push_back(BrokerError::new(message));
    }

    /// Makes the next `publish` call fail.
    pub fn queue_publish_failure(&self, message: &str) {
        self.shared
            .publish_failures
            .lock()
            .push_back(BrokerError::new(message));
    }

    /// Delivers an inbound message on the current connection.
    pub fn inject_message(&self, payload: Vec<u8>) {
        if let Some(events) = self.shared.events.lock().as_ref() {
            let _ = events.send(BrokerEvent::Message(payload));
        }
    }

    /// Makes `disconnect` withhold its confirmation event until
    /// [`confirm_disconnect`](FakeBrokerController::confirm_disconnect) is
    /// called, widening the window between a disconnect request and its
    /// confirmation.
    pub fn hold_disconnect_confirmations(&self) {
        self.shared.hold_disconnects.store(true, Ordering::SeqCst);
    }

    /// Delivers the oldest withheld disconnect confirmation.
    pub fn confirm_disconnect(&self) {
        let held = {
            let mut held_disconnects = self.shared.held_disconnects.lock();
            if held_disconnects.is_empty() {
                None
            } else {
                Some(held_disconnects.remove(0))
            }
        };
        if let Some(events) = held {
            let _ = events.send(BrokerEvent::Disconnected(None));
        }
    }

    /// Drops the current connection, as if the broker went away.
    pub fn inject_disconnect(&self, error: Option<&str>) {
        if let Some(events) = self.shared.events.lock().take() {
            let _ = events.send(BrokerEvent::Disconnected(error.map(BrokerError::new)));
        }
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.shared.published.lock().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.subscriptions.lock().clone()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.shared.credentials.lock().clone()
    }

    pub fn connect_calls(&self) -> u32 {
        self.shared.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.shared.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.events.lock().is_some()
    }
}

// ---------------------------------------------------------------------------
// Bootstrap

/// Bootstrap fake returning a fixed grant, with a queue of one-shot
/// failures served first.
pub struct FakeBootstrap {
    grant: Mutex<TopicGrant>,
    failures: Mutex<VecDeque<Error>>,
    calls: AtomicU32,
}

impl FakeBootstrap {
    pub fn new(grant: TopicGrant) -> Arc<Self> {
        Arc::new(Self {
            grant: Mutex::new(grant),
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        })
    }

    /// Makes the next `issue` call fail with the given error.
    pub fn queue_failure(&self, error: Error) {
        self.failures.lock().push_back(error);
    }

    pub fn set_grant(&self, grant: TopicGrant) {
        *self.grant.lock() = grant;
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BootstrapClient for FakeBootstrap {
    async fn issue(&self, _tracking_identifier: &str, _role: Role) -> Result<TopicGrant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(self.grant.lock().clone())
    }
}

// ---------------------------------------------------------------------------
// Position source

#[derive(Default)]
struct PositionShared {
    updates: Mutex<Option<mpsc::UnboundedSender<PositionEvent>>>,
    start_failure: Mutex<Option<PositionError>>,
    starts: AtomicU32,
    stops: AtomicU32,
}

/// Position source fake handed to a publisher session.
pub struct FakePositionSource {
    shared: Arc<PositionShared>,
}

/// Test-side controller for a [`FakePositionSource`].
#[derive(Clone)]
pub struct FakePositionController {
    shared: Arc<PositionShared>,
}

impl FakePositionSource {
    pub fn new() -> (Self, FakePositionController) {
        let shared = Arc::new(PositionShared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            FakePositionController { shared },
        )
    }
}

impl PositionSource for FakePositionSource {
    fn start_tracking(
        &mut self,
        updates: mpsc::UnboundedSender<PositionEvent>,
    ) -> std::result::Result<(), PositionError> {
        self.shared.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.shared.start_failure.lock().take() {
            return Err(error);
        }
        *self.shared.updates.lock() = Some(updates);
        Ok(())
    }

    fn stop_tracking(&mut self) {
        self.shared.stops.fetch_add(1, Ordering::SeqCst);
        self.shared.updates.lock().take();
    }
}

impl FakePositionController {
    /// Makes the next `start_tracking` call fail, as a denied permission
    /// would.
    pub fn fail_next_start(&self, message: &str) {
        *self.shared.start_failure.lock() = Some(PositionError::new(message));
    }

    /// Emits a position update on the current tracking channel.
    pub fn push_sample(&self, sample: LocationSample) {
        if let Some(updates) = self.shared.updates.lock().as_ref() {
            let _ = updates.send(PositionEvent::Update(sample));
        }
    }

    /// Emits a runtime position failure.
    pub fn fail(&self, message: &str) {
        if let Some(updates) = self.shared.updates.lock().as_ref() {
            let _ = updates.send(PositionEvent::Failure(PositionError::new(message)));
        }
    }

    pub fn starts(&self) -> u32 {
        self.shared.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u32 {
        self.shared.stops.load(Ordering::SeqCst)
    }

    pub fn is_tracking(&self) -> bool {
        self.shared.updates.lock().is_some()
    }
}
