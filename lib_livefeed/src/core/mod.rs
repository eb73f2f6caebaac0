//! # Core Feed Module
//!
//! The synchronous building blocks of the live feed. Nothing in here performs I/O
//! or suspends; the feed controller composes these behind locks and drives them
//! from the transport tasks.
//!
//! ## Core Components:
//!
//! - **`message`**: The wire shape and the normalized `FeedMessage`, including id
//!   synthesis for messages the server sent without one.
//!
//! - **`bounded_log`**: The de-duplicating sliding window (default 200 entries).
//!
//! - **`reconciler`**: Optimistic view counters and flash pulses, overwritten by
//!   server confirmations.
//!
//! - **`transport`**: The push/polling state machine.
//!
//! - **`dispatcher`**: Versioned snapshot fan-out to listeners.

/// Wire and normalized message types.
pub mod message;
/// De-duplicating, capacity-bounded log.
pub mod bounded_log;
/// Optimistic view-count reconciliation.
pub mod reconciler;
/// Push/polling transport state machine.
pub mod transport;
/// Listener registry and snapshot fan-out.
pub mod dispatcher;

// --- Public API Re-exports ---
pub use bounded_log::{BoundedLog, DEFAULT_CAPACITY};
pub use dispatcher::{Dispatcher, Subscription};
pub use message::{FeedMessage, Keyed, WireMessage};
pub use reconciler::{Confirmation, PendingIncrement, Reconciler, ViewEntry, ViewSnapshot};
pub use transport::{TransportEvent, TransportSelector, TransportState, Transition};
