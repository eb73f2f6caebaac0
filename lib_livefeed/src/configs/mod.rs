//! # Configuration Modules
//!
//! Feed settings with defaults, JSON5 file loading and validation. Layering over
//! environment variables and command-line flags is left to binaries.

/// Settings for a single live feed.
pub mod feed_config;

pub use feed_config::FeedConfig;
