//! Connection-level bookkeeping.
//!
//! # Design Decisions
//! - Socket handling belongs to axum; this layer only hands out opaque
//!   handles and counts in-flight work for draining

pub mod connection;

pub use connection::{ConnectionHandle, InFlightTracker};
