//! # Data Ingestors Module
//!
//! Everything that brings feed data in from the backend.
//!
//! ## Purpose:
//! The controller never talks to the network directly. It goes through the
//! [`FeedBackend`] trait, which names the three calls the feed needs:
//! the recent-message fetch used by polling, the push connection, and the
//! view-count POST. Production code plugs in [`RemoteBackend`]; tests plug in
//! scripted backends.
//!
//! ## Contained Modules:
//! - **`poller`**: The single-timer, self-rescheduling poll loop.
//! - **`ws_push`**: A WebSocket client that turns frames into [`PushEvent`]s.
//! - **`remote`**: The HTTP + WebSocket implementation of [`FeedBackend`].

use std::future::Future;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::message::WireMessage;
use crate::error::FeedResult;

/// Interval poll loop with idempotent start.
pub mod poller;
/// WebSocket push connection.
#[cfg(feature = "ingestors")]
pub mod ws_push;
/// Production backend over HTTP and WebSocket.
#[cfg(feature = "ingestors")]
pub mod remote;

pub use poller::Poller;
#[cfg(feature = "ingestors")]
pub use remote::RemoteBackend;

/// One event from an open push connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A single message, delivered as soon as it arrived.
    Message(WireMessage),
    /// The connection is gone. No further events follow.
    Closed { reason: Option<String> },
}

/// # Push Channel
///
/// The consumer end of an established push connection. Closing or dropping it
/// cancels the reader task behind it.
#[derive(Debug)]
pub struct PushChannel {
    events: mpsc::Receiver<PushEvent>,
    cancel: CancellationToken,
}

impl PushChannel {
    /// Wraps a receiver fed by a reader task that honors `cancel`.
    pub fn new(events: mpsc::Receiver<PushEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Next event; `None` once the reader task has gone away.
    pub async fn next(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }

    /// Detaches from the connection.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// # Feed Backend
///
/// The external collaborator. Implementations must be cheap to share across
/// tasks; the controller holds them in an `Arc`.
pub trait FeedBackend: Send + Sync + 'static {
    /// `GET /feed/recent`: the full recent-message set, oldest first.
    fn fetch_recent(&self) -> impl Future<Output = FeedResult<Vec<WireMessage>>> + Send;

    /// Opens the push connection. Errors mean "push unavailable", never fatal.
    fn connect_push(&self) -> impl Future<Output = FeedResult<PushChannel>> + Send;

    /// `POST /entities/{id}/view`: returns the authoritative view count.
    fn post_view(&self, entity_id: &str) -> impl Future<Output = FeedResult<u64>> + Send;
}
