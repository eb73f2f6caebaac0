//! # Feed Configuration
//!
//! Settings for one live feed. Every field has a default, so a configuration file
//! only needs the keys it wants to change. Files are JSON5 (comments and trailing
//! commas allowed), keys in camelCase.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::bounded_log::DEFAULT_CAPACITY;
use crate::error::{FeedError, FeedResult};

/// Poll cadence when push is unavailable.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
/// Upper bound on the push handshake before falling back.
pub const DEFAULT_PUSH_CONNECT_TIMEOUT_MS: u64 = 5000;

/// # Feed Config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedConfig {
    /// Absolute base for the REST endpoints (`feed/recent`, `entities/{id}/view`).
    pub base_url: String,
    /// WebSocket URL of the push channel.
    pub push_url: String,
    pub poll_interval_ms: u64,
    pub buffer_capacity: usize,
    pub push_connect_timeout_ms: u64,
    /// When set, re-attempt push this often while degraded to polling.
    /// Unset means a failed or closed push stays degraded for the session.
    pub push_reprobe_interval_ms: Option<u64>,
    pub http_max_retries: u32,
    pub http_timeout_ms: u64,
    pub user_agent: String,
    pub auth_token: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/".to_string(),
            push_url: "ws://127.0.0.1:8080/feed/stream".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            buffer_capacity: DEFAULT_CAPACITY,
            push_connect_timeout_ms: DEFAULT_PUSH_CONNECT_TIMEOUT_MS,
            push_reprobe_interval_ms: None,
            http_max_retries: 0,
            http_timeout_ms: 10_000,
            user_agent: "LiveFeed/0.1".to_string(),
            auth_token: None,
        }
    }
}

impl FeedConfig {
    /// Parses a JSON5 document. Missing keys take their defaults.
    pub fn from_json5_str(source: &str) -> FeedResult<Self> {
        Ok(serde_json5::from_str(source)?)
    }

    /// Reads and parses a JSON5 file.
    pub fn from_file(path: &Path) -> FeedResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| FeedError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json5_str(&source)
    }

    /// Rejects values the feed cannot run with.
    pub fn validate(&self) -> FeedResult<()> {
        if self.buffer_capacity == 0 {
            return Err(FeedError::Config("bufferCapacity must be greater than zero".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(FeedError::Config("pollIntervalMs must be greater than zero".into()));
        }
        if self.push_connect_timeout_ms == 0 {
            return Err(FeedError::Config("pushConnectTimeoutMs must be greater than zero".into()));
        }
        if self.push_reprobe_interval_ms == Some(0) {
            return Err(FeedError::Config("pushReprobeIntervalMs must be greater than zero when set".into()));
        }

        let base = Url::parse(&self.base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(FeedError::Config(format!("baseUrl must be http(s), got '{}'", base.scheme())));
        }
        let push = Url::parse(&self.push_url)?;
        if !matches!(push.scheme(), "ws" | "wss") {
            return Err(FeedError::Config(format!("pushUrl must be ws(s), got '{}'", push.scheme())));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn push_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.push_connect_timeout_ms)
    }

    pub fn push_reprobe_interval(&self) -> Option<Duration> {
        self.push_reprobe_interval_ms.map(Duration::from_millis)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = FeedConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.buffer_capacity, 200);
        assert_eq!(config.push_reprobe_interval(), None);
    }

    #[test]
    fn partial_json5_keeps_other_defaults() {
        let config = FeedConfig::from_json5_str(
            r#"{
                // faster polling for the demo
                pollIntervalMs: 500,
                pushUrl: "wss://feed.example.com/stream",
            }"#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.push_url, "wss://feed.example.com/stream");
        assert_eq!(config.buffer_capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ bufferCapacity: 50, pushReprobeIntervalMs: 30000 }}").unwrap();

        let config = FeedConfig::from_file(file.path()).unwrap();
        assert_eq!(config.buffer_capacity, 50);
        assert_eq!(config.push_reprobe_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = FeedConfig::from_file(Path::new("/definitely/not/here.json5")).unwrap_err();
        assert!(matches!(err, FeedError::Config(_)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            FeedConfig { buffer_capacity: 0, ..FeedConfig::default() },
            FeedConfig { poll_interval_ms: 0, ..FeedConfig::default() },
            FeedConfig { push_reprobe_interval_ms: Some(0), ..FeedConfig::default() },
            FeedConfig { push_url: "http://127.0.0.1/stream".into(), ..FeedConfig::default() },
            FeedConfig { base_url: "not a url".into(), ..FeedConfig::default() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?} should be rejected", config);
        }
    }
}
