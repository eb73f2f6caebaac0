//! # Feed Errors
//!
//! A single error enum for the whole library. None of these are fatal to the
//! process: transport errors degrade freshness, view errors leave the optimistic
//! value standing.

use thiserror::Error;

/// Errors produced by the live feed pipeline.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The push connection could not be established (refused, timed out, bad handshake).
    #[error("push connection setup failed: {0}")]
    TransportSetup(String),

    /// A single poll cycle failed to fetch or decode the recent-message set.
    #[error("poll fetch failed: {0}")]
    PollFetch(String),

    /// The server did not confirm a view increment.
    #[error("view increment for '{entity_id}' failed: {reason}")]
    ViewIncrement { entity_id: String, reason: String },

    /// Transport-level HTTP failure or a non-2xx status.
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Rejected configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// `start()` was called on a controller whose feed is still running.
    #[error("feed is already running")]
    AlreadyRunning,
}

/// Convenience alias used throughout the crate.
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(feature = "retrieve")]
impl From<anyhow::Error> for FeedError {
    fn from(value: anyhow::Error) -> Self {
        // Alternate formatting keeps the whole cause chain on one line.
        Self::Http(format!("{:#}", value))
    }
}

#[cfg(feature = "retrieve")]
impl From<reqwest::Error> for FeedError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

#[cfg(feature = "ingestors")]
impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::TransportSetup(value.to_string())
    }
}

impl From<serde_json5::Error> for FeedError {
    fn from(value: serde_json5::Error) -> Self {
        Self::Config(value.to_string())
    }
}
