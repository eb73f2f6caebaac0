//! # Remote Backend
//!
//! The production [`FeedBackend`]: REST for the recent-message set and view
//! increments, WebSocket for push.

use reqwest::Method;
use serde::Deserialize;

use crate::configs::FeedConfig;
use crate::core::message::WireMessage;
use crate::error::{FeedError, FeedResult};
use crate::ingestors::{ws_push, FeedBackend, PushChannel};
use crate::retrieve::ky_http::{ApiClient, HttpOptions};

const FEED_RECENT: [&str; 2] = ["feed", "recent"];

/// Body of `POST /entities/{id}/view`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewCountResponse {
    view_count: u64,
}

/// # Remote Backend
pub struct RemoteBackend {
    api: ApiClient,
    push_url: String,
}

impl RemoteBackend {
    /// Builds the HTTP client from `config`. The config is validated first.
    pub fn from_config(config: &FeedConfig) -> FeedResult<Self> {
        config.validate()?;
        let api = ApiClient::new(
            &config.base_url,
            HttpOptions {
                max_retries: config.http_max_retries,
                timeout: config.http_timeout(),
                user_agent: config.user_agent.clone(),
                auth_token: config.auth_token.clone(),
            },
        )?;
        Ok(Self {
            api,
            push_url: config.push_url.clone(),
        })
    }

    pub fn push_url(&self) -> &str {
        &self.push_url
    }
}

impl FeedBackend for RemoteBackend {
    async fn fetch_recent(&self) -> FeedResult<Vec<WireMessage>> {
        self.api
            .request::<Vec<WireMessage>, ()>(Method::GET, &FEED_RECENT, None, None)
            .await
            .map_err(|e| FeedError::PollFetch(format!("{:#}", e)))?
            .into_data()
            .map_err(|e| FeedError::PollFetch(e.to_string()))
    }

    async fn connect_push(&self) -> FeedResult<PushChannel> {
        ws_push::connect_push(&self.push_url).await
    }

    async fn post_view(&self, entity_id: &str) -> FeedResult<u64> {
        let failed = |reason: String| FeedError::ViewIncrement {
            entity_id: entity_id.to_string(),
            reason,
        };

        let response = self
            .api
            .request::<ViewCountResponse, ()>(Method::POST, &["entities", entity_id, "view"], None, None)
            .await
            .map_err(|e| failed(format!("{:#}", e)))?;
        let body = response.into_data().map_err(|e| failed(e.to_string()))?;
        Ok(body.view_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = FeedConfig {
            base_url: "ftp://example.com/".into(),
            ..FeedConfig::default()
        };
        assert!(matches!(RemoteBackend::from_config(&config), Err(FeedError::Config(_))));
    }

    #[test]
    fn keeps_push_url() {
        let backend = RemoteBackend::from_config(&FeedConfig::default()).unwrap();
        assert_eq!(backend.push_url(), "ws://127.0.0.1:8080/feed/stream");
    }

    #[tokio::test]
    async fn unreachable_server_yields_poll_fetch_error() {
        let config = FeedConfig {
            base_url: "http://127.0.0.1:9/".into(),
            http_timeout_ms: 2000,
            ..FeedConfig::default()
        };
        let backend = RemoteBackend::from_config(&config).unwrap();
        assert!(matches!(backend.fetch_recent().await, Err(FeedError::PollFetch(_))));
        assert!(matches!(
            backend.post_view("ad-1").await,
            Err(FeedError::ViewIncrement { .. })
        ));
    }
}
