//! # lib_livefeed
//!
//! Keeps a live message feed in sync with a backend. Messages arrive over a
//! WebSocket push channel when one can be opened and over periodic REST polling
//! when it cannot. Both paths feed one de-duplicating window of the newest
//! messages. View counters are bumped optimistically and then overwritten by the
//! server's count.
//!
//! ```no_run
//! use lib_livefeed::{FeedConfig, FeedController};
//!
//! # async fn run() -> lib_livefeed::FeedResult<()> {
//! let feed = FeedController::remote(FeedConfig::default())?;
//! let _sub = feed.subscribe(|window| println!("{} message(s)", window.len()));
//! let handle = feed.start()?;
//! // ...
//! feed.stop(handle);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod core;
pub mod ingestors;
#[cfg(feature = "retrieve")]
pub mod retrieve;
pub mod configs;
pub mod feed;

// Re-export everything a consumer needs
pub use crate::configs::FeedConfig;
pub use crate::core::{
    FeedMessage, Subscription, TransportState, ViewEntry, ViewSnapshot, WireMessage,
};
pub use crate::error::{FeedError, FeedResult};
pub use crate::feed::{FeedController, FeedHandle, MessageSnapshot, PendingView, ViewOutcome};
pub use crate::ingestors::{FeedBackend, PushChannel, PushEvent};
#[cfg(feature = "ingestors")]
pub use crate::ingestors::RemoteBackend;
