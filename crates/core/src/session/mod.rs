//! Session lifecycle subsystem.
//!
//! This module centralizes the session state machine, the controller task
//! that owns it, and the caller-facing publisher/subscriber facades. All
//! state mutation happens on the controller task; facades and collaborator
//! callbacks talk to it over channels only.

/// Controller task and its command/flow plumbing.
mod controller;
/// Caller-visible session events.
pub mod events;
/// Publisher/subscriber facades over the controller task.
pub mod handle;
/// Session status and state record.
pub mod state;

pub use events::TrackerEvent;
pub use handle::{Publisher, Subscriber};
pub use state::Status;
