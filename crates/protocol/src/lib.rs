//! Wire types for the live tracking protocol.
//!
//! This crate contains the serde-serializable types used for talking to the
//! Topic Authority (REST) and for the location records carried over the
//! message broker. These types represent the "protocol layer" - the shapes of
//! data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with protocol: Match the tracking service's wire schema exactly
//! * Stable: Changes only when the wire format changes
//!
//! Higher-level ergonomic APIs are built on top of these types in
//! `livetrack`.

pub mod authority;
pub mod record;

pub use authority::*;
pub use record::*;
