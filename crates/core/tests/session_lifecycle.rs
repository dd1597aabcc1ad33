//! End-to-end session lifecycle tests against in-memory fakes.

use std::future::Future;
use std::time::Duration;

use chrono::{SubsecRound, TimeDelta, Utc};

use livetrack::session::handle::EventReceiver;
use livetrack::testing::{FakeBootstrap, FakeBroker, FakePositionSource};
use livetrack::{
    codec, Credentials, Error, LocationSample, Publisher, ServiceConfig, Status, Subscriber,
    TopicGrant, TrackerEvent,
};

fn config() -> ServiceConfig {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    ServiceConfig::new("https://tracking.example.com/".parse().unwrap(), "token")
        .with_retry(3, Duration::from_millis(50))
}

fn grant(topic: &str) -> TopicGrant {
    TopicGrant {
        topic: topic.to_string(),
        credentials: Credentials {
            username: "ephemeral-user".to_string(),
            password: "ephemeral-pass".to_string(),
        },
    }
}

fn sample(longitude: f64, latitude: f64) -> LocationSample {
    LocationSample {
        longitude,
        latitude,
        course: 10.0,
        speed: 2.5,
        // The wire format carries millisecond precision.
        timestamp: Utc::now().trunc_subsecs(3),
    }
}

async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..400 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn next_event(events: &mut EventReceiver) -> TrackerEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn assert_no_event(events: &mut EventReceiver) {
    tokio::time::sleep(Duration::from_millis(100)).await;
    if let Ok(event) = events.try_recv() {
        panic!("unexpected event: {event:?}");
    }
}

#[tokio::test]
async fn publisher_streams_samples_on_the_granted_topic() {
    let bootstrap = FakeBootstrap::new(grant("tracks/trip-42"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (source, source_ctl) = FakePositionSource::new();
    let (publisher, _events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip-42").await.unwrap();
    wait_until("session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    let update = sample(51.4, 35.7);
    source_ctl.push_sample(update.clone());
    wait_until("sample published", || async {
        !broker_ctl.published().is_empty()
    })
    .await;

    let published = broker_ctl.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "tracks/trip-42");
    let decoded = codec::decode(&published[0].1).unwrap();
    assert_eq!(decoded, update);

    assert_eq!(bootstrap.calls(), 1);
    assert_eq!(
        broker_ctl.credentials().unwrap().username,
        "ephemeral-user"
    );
    assert!(source_ctl.is_tracking());
}

#[tokio::test]
async fn start_is_rejected_while_starting_or_running() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, _broker_ctl) = FakeBroker::new();
    let (source, _source_ctl) = FakePositionSource::new();
    let (publisher, _events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip-a").await.unwrap();
    wait_until("session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    let error = publisher.start("trip-b").await.unwrap_err();
    assert!(matches!(error, Error::ServiceCurrentlyRunning));
    // The rejected call must not have triggered another bootstrap.
    assert_eq!(bootstrap.calls(), 1);
    assert_eq!(publisher.status().await.unwrap(), Status::Running);
}

#[tokio::test]
async fn blank_access_token_is_rejected_synchronously() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, _broker_ctl) = FakeBroker::new();
    let (source, _source_ctl) = FakePositionSource::new();
    let blank = ServiceConfig::new("https://tracking.example.com/".parse().unwrap(), "  ");
    let (publisher, _events) =
        Publisher::with_bootstrap(blank, bootstrap.clone(), Box::new(broker), Box::new(source));

    let error = publisher.start("trip").await.unwrap_err();
    assert!(matches!(error, Error::AccessTokenNotAvailable));
    assert_eq!(publisher.status().await.unwrap(), Status::Initiated);
    assert_eq!(bootstrap.calls(), 0);
}

#[tokio::test]
async fn bootstrap_retries_then_stops_with_a_single_terminal_event() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    for _ in 0..4 {
        bootstrap.queue_failure(Error::Transient("authority unreachable".into()));
    }
    let (broker, broker_ctl) = FakeBroker::new();
    let (source, _source_ctl) = FakePositionSource::new();
    let (publisher, mut events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session stopped", || async {
        publisher.status().await.unwrap() == Status::Stopped
    })
    .await;

    // Initial attempt plus three retries.
    assert_eq!(bootstrap.calls(), 4);
    assert_eq!(broker_ctl.connect_calls(), 0);
    let event = next_event(&mut events).await;
    assert!(matches!(event, TrackerEvent::Stopped(Some(Error::Transient(_)))));
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn unauthorized_bootstrap_stops_without_retrying() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    bootstrap.queue_failure(Error::Unauthorized);
    let (broker, _broker_ctl) = FakeBroker::new();
    let (source, _source_ctl) = FakePositionSource::new();
    let (publisher, mut events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session stopped", || async {
        publisher.status().await.unwrap() == Status::Stopped
    })
    .await;

    assert_eq!(bootstrap.calls(), 1);
    let event = next_event(&mut events).await;
    assert!(matches!(event, TrackerEvent::Stopped(Some(Error::Unauthorized))));
}

#[tokio::test]
async fn stop_is_idempotent_and_emits_one_stopped_event() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (source, source_ctl) = FakePositionSource::new();
    let (publisher, mut events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    publisher.stop().await.unwrap();
    publisher.stop().await.unwrap();

    let event = next_event(&mut events).await;
    assert!(matches!(event, TrackerEvent::Stopped(None)));
    assert_no_event(&mut events).await;

    assert_eq!(publisher.status().await.unwrap(), Status::Stopped);
    assert_eq!(broker_ctl.disconnect_calls(), 1);
    assert_eq!(source_ctl.stops(), 1);
    assert!(!source_ctl.is_tracking());
}

#[tokio::test]
async fn restart_reuses_the_stored_grant_without_bootstrapping_again() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (source, _source_ctl) = FakePositionSource::new();
    let (publisher, mut events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;
    publisher.stop().await.unwrap();
    wait_until("stopped event", || {
        let stopped = matches!(events.try_recv(), Ok(TrackerEvent::Stopped(None)));
        async move { stopped }
    })
    .await;

    publisher.restart().await.unwrap();
    wait_until("session running again", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    assert_eq!(bootstrap.calls(), 1);
    assert_eq!(broker_ctl.connect_calls(), 2);
}

#[tokio::test]
async fn restart_before_any_start_is_rejected() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, _broker_ctl) = FakeBroker::new();
    let (source, _source_ctl) = FakePositionSource::new();
    let (publisher, _events) = Publisher::with_bootstrap(
        config(),
        bootstrap,
        Box::new(broker),
        Box::new(source),
    );

    let error = publisher.restart().await.unwrap_err();
    assert!(matches!(error, Error::TrackingIdentifierNotAvailable));
}

#[tokio::test]
async fn unexpected_disconnect_reconnects_and_resumes() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (source, source_ctl) = FakePositionSource::new();
    let (publisher, mut events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    broker_ctl.inject_disconnect(Some("connection reset"));
    wait_until("reconnected", || async { broker_ctl.connect_calls() == 2 }).await;
    wait_until("running after reconnect", || async {
        publisher.status().await.unwrap() == Status::Running && broker_ctl.is_connected()
    })
    .await;

    // The reconnect restarted position tracking and never re-bootstrapped.
    assert_eq!(source_ctl.starts(), 2);
    assert_eq!(bootstrap.calls(), 1);
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn stop_cancels_a_pending_reconnect() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (source, _source_ctl) = FakePositionSource::new();
    let slow_retry = config().with_retry(3, Duration::from_millis(500));
    let (publisher, mut events) = Publisher::with_bootstrap(
        slow_retry,
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    broker_ctl.inject_disconnect(Some("connection reset"));
    wait_until("disconnect observed", || async { !broker_ctl.is_connected() }).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    publisher.stop().await.unwrap();
    let event = next_event(&mut events).await;
    assert!(matches!(event, TrackerEvent::Stopped(None)));

    // Well past the retry deadline, no reconnect may have fired.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(broker_ctl.connect_calls(), 1);
    assert_eq!(publisher.status().await.unwrap(), Status::Stopped);
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn start_during_stop_confirmation_supersedes_the_stopped_event() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (source, _source_ctl) = FakePositionSource::new();
    let (publisher, mut events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    // Widen the window between the disconnect request and its confirmation,
    // and start a new session inside it.
    broker_ctl.hold_disconnect_confirmations();
    publisher.stop().await.unwrap();
    assert_eq!(publisher.status().await.unwrap(), Status::Stopped);
    publisher.start("trip-2").await.unwrap();
    broker_ctl.confirm_disconnect();

    wait_until("second session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    // The new session came up on a fresh connection; the superseded
    // episode's late confirmation was discarded rather than reported, so no
    // Stopped event surfaces at all.
    assert_eq!(broker_ctl.connect_calls(), 2);
    assert_eq!(bootstrap.calls(), 2);
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn position_permission_failure_is_terminal() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (source, source_ctl) = FakePositionSource::new();
    source_ctl.fail_next_start("location permission denied");
    let (publisher, mut events) = Publisher::with_bootstrap(
        config(),
        bootstrap.clone(),
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session stopped", || async {
        publisher.status().await.unwrap() == Status::Stopped
    })
    .await;

    let event = next_event(&mut events).await;
    assert!(matches!(event, TrackerEvent::Stopped(Some(Error::Permission(_)))));
    assert_no_event(&mut events).await;
    // The already-open broker connection was torn down.
    assert_eq!(broker_ctl.disconnect_calls(), 1);
}

#[tokio::test]
async fn runtime_position_failure_stops_the_session() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, _broker_ctl) = FakeBroker::new();
    let (source, source_ctl) = FakePositionSource::new();
    let (publisher, mut events) = Publisher::with_bootstrap(
        config(),
        bootstrap,
        Box::new(broker),
        Box::new(source),
    );

    publisher.start("trip").await.unwrap();
    wait_until("session running", || async {
        publisher.status().await.unwrap() == Status::Running
    })
    .await;

    source_ctl.fail("gps unavailable");
    wait_until("session stopped", || async {
        publisher.status().await.unwrap() == Status::Stopped
    })
    .await;
    let event = next_event(&mut events).await;
    assert!(matches!(event, TrackerEvent::Stopped(Some(Error::Permission(_)))));
}

#[tokio::test]
async fn subscriber_receives_fresh_samples_and_filters_stale_ones() {
    let bootstrap = FakeBootstrap::new(grant("tracks/trip-42"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (subscriber, mut events) =
        Subscriber::with_bootstrap(config(), bootstrap.clone(), Box::new(broker));

    subscriber.start("trip-42").await.unwrap();
    wait_until("session running", || async {
        subscriber.status().await.unwrap() == Status::Running
    })
    .await;
    assert_eq!(broker_ctl.subscriptions(), vec!["tracks/trip-42".to_string()]);

    let first = sample(51.4, 35.7);
    let older = LocationSample {
        timestamp: first.timestamp - TimeDelta::seconds(1),
        ..first.clone()
    };
    let expired = LocationSample {
        timestamp: first.timestamp - TimeDelta::minutes(10),
        ..first.clone()
    };
    let newer = LocationSample {
        timestamp: first.timestamp + TimeDelta::seconds(1),
        ..first.clone()
    };

    broker_ctl.inject_message(codec::encode(&first).unwrap());
    broker_ctl.inject_message(codec::encode(&older).unwrap());
    broker_ctl.inject_message(codec::encode(&expired).unwrap());
    broker_ctl.inject_message(codec::encode(&newer).unwrap());

    match next_event(&mut events).await {
        TrackerEvent::LocationReceived(sample) => assert_eq!(sample, first),
        other => panic!("unexpected event: {other:?}"),
    }
    match next_event(&mut events).await {
        TrackerEvent::LocationReceived(sample) => assert_eq!(sample, newer),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn undecodable_message_is_reported_without_stopping() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    let (subscriber, mut events) =
        Subscriber::with_bootstrap(config(), bootstrap, Box::new(broker));

    subscriber.start("trip").await.unwrap();
    wait_until("session running", || async {
        subscriber.status().await.unwrap() == Status::Running
    })
    .await;

    broker_ctl.inject_message(b"not a record".to_vec());
    let event = next_event(&mut events).await;
    assert!(matches!(event, TrackerEvent::Failed(Error::Codec(_))));

    // Still running; a good sample gets through afterwards.
    let good = sample(51.4, 35.7);
    broker_ctl.inject_message(codec::encode(&good).unwrap());
    match next_event(&mut events).await {
        TrackerEvent::LocationReceived(sample) => assert_eq!(sample, good),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(subscriber.status().await.unwrap(), Status::Running);
}

#[tokio::test]
async fn subscribe_failure_retries_the_connection_without_bootstrapping() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    broker_ctl.queue_subscribe_failure("not authorized on topic yet");
    let (subscriber, _events) =
        Subscriber::with_bootstrap(config(), bootstrap.clone(), Box::new(broker));

    subscriber.start("trip").await.unwrap();
    wait_until("running after retry", || async {
        subscriber.status().await.unwrap() == Status::Running
    })
    .await;

    assert_eq!(bootstrap.calls(), 1);
    assert_eq!(broker_ctl.connect_calls(), 2);
    assert_eq!(broker_ctl.subscriptions(), vec!["tracks/a".to_string()]);
}

#[tokio::test]
async fn connect_failures_exhaust_the_retry_budget_terminally() {
    let bootstrap = FakeBootstrap::new(grant("tracks/a"));
    let (broker, broker_ctl) = FakeBroker::new();
    for _ in 0..4 {
        broker_ctl.queue_connect_failure("broker down");
    }
    let (subscriber, mut events) =
        Subscriber::with_bootstrap(config(), bootstrap.clone(), Box::new(broker));

    subscriber.start("trip").await.unwrap();
    wait_until("session stopped", || async {
        subscriber.status().await.unwrap() == Status::Stopped
    })
    .await;

    assert_eq!(bootstrap.calls(), 1);
    assert_eq!(broker_ctl.connect_calls(), 4);
    let event = next_event(&mut events).await;
    assert!(matches!(event, TrackerEvent::Stopped(Some(Error::Broker(_)))));
    assert_no_event(&mut events).await;
}
