//! # Live Feed
//!
//! The public face of the crate: [`FeedController`] ties the core building blocks
//! to a [`FeedBackend`](crate::ingestors::FeedBackend) and exposes the
//! start/stop/subscribe contract.

/// Session lifecycle, transport supervision and listener fan-out.
pub mod controller;

pub use controller::{FeedController, FeedHandle, MessageSnapshot, PendingView, ViewOutcome};
