//! Live-location publish/subscribe session SDK.
//!
//! One side ([`Publisher`]) streams periodic position samples under a
//! caller-chosen tracking identifier; the other side ([`Subscriber`])
//! receives them. The crate owns the session lifecycle: bootstrapping
//! ephemeral broker credentials from the Topic Authority over REST,
//! establishing and maintaining a broker connection with bounded retry,
//! multiplexing telemetry onto the per-session topic, and validating the
//! freshness of received samples.
//!
//! The broker transport itself and position sampling are collaborator
//! seams ([`BrokerSession`], [`PositionSource`]) supplied by the caller.
//!
//! # Example
//!
//! ```ignore
//! use livetrack::{Publisher, ServiceConfig, TrackerEvent};
//!
//! let config = ServiceConfig::new(
//!     "https://tracking.example.com/".parse()?,
//!     "my-access-token",
//! );
//! let (publisher, mut events) = Publisher::new(config, broker, position_source)?;
//!
//! publisher.start("trip-42").await?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         TrackerEvent::Published(sample) => println!("sent {sample:?}"),
//!         TrackerEvent::Stopped(err) => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod bootstrap;
pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod freshness;
pub mod location;
pub mod retry;
pub mod session;
pub mod testing;

pub use bootstrap::{BootstrapClient, TopicBootstrapClient, TopicGrant};
pub use broker::{BrokerError, BrokerEvent, BrokerSession, Credentials};
pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use freshness::FreshnessValidator;
pub use livetrack_protocol::Role;
pub use location::{LocationSample, PositionError, PositionEvent, PositionSource};
pub use retry::{RetryDecision, RetryPolicy};
pub use session::{Publisher, Status, Subscriber, TrackerEvent};
