//! # HTTP Retrieval Utilities
//!
//! A small asynchronous API client wrapper around `reqwest`, with retry middleware
//! for transient failures and standardized JSON response handling.
//!
//! Paths are given as segment lists and percent-encoded individually, so an
//! entity id containing `/` or spaces cannot escape its path position.

use std::time::Duration;

use reqwest::{header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE}, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{FeedError, FeedResult};

/// A standardized container for API responses.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Turns a non-2xx (or bodiless) response into `FeedError::Http`.
    pub fn into_data(self) -> FeedResult<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(FeedError::Http(format!(
                "status {}: {}",
                self.status,
                self.error_body.unwrap_or_default()
            ))),
        }
    }
}

/// Knobs for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Retries on transient failures. Zero disables the retry middleware's effect.
    pub max_retries: u32,
    pub timeout: Duration,
    pub user_agent: String,
    /// Optional Bearer token for the Authorization header.
    pub auth_token: Option<String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_retries: 0,
            timeout: Duration::from_secs(10),
            user_agent: "LiveFeed/0.1".to_string(),
            auth_token: None,
        }
    }
}

/// A flexible asynchronous HTTP client bound to one base URL.
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client. `base_url` must be absolute; a missing trailing slash is
    /// added so that the base path is never replaced by joined segments.
    pub fn new(base_url: &str, options: HttpOptions) -> FeedResult<Self> {
        let mut url = Url::parse(base_url)?;
        if url.cannot_be_a_base() {
            return Err(FeedError::Config(format!("base URL '{}' cannot be a base", base_url)));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(options.max_retries);
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()?;
        let inner = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner,
            base_url: url,
            auth_token: options.auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded `segments` to the base URL.
    pub fn endpoint(&self, segments: &[&str]) -> FeedResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FeedError::Config(format!("base URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Performs a request against `segments` and decodes a JSON body on success.
    ///
    /// # Errors
    /// Network failures and undecodable 2xx bodies. Non-2xx statuses are not
    /// errors here; they come back with `success == false`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        segments: &[&str],
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self.endpoint(segments)?;
        log::trace!("{} {}", method, full_url);
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_without_trailing_slash_keeps_its_path() {
        let client = ApiClient::new("http://localhost:8080/api", HttpOptions::default()).unwrap();
        let url = client.endpoint(&["feed", "recent"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/feed/recent");
    }

    #[test]
    fn segments_are_percent_encoded() {
        let client = ApiClient::new("http://localhost:8080/", HttpOptions::default()).unwrap();
        let url = client.endpoint(&["entities", "ad 7/x", "view"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/entities/ad%207%2Fx/view");
    }

    #[test]
    fn relative_base_is_rejected() {
        assert!(matches!(
            ApiClient::new("feed/recent", HttpOptions::default()),
            Err(FeedError::InvalidUrl(_))
        ));
    }

    #[test]
    fn non_success_response_becomes_http_error() {
        let resp: ApiResponse<u64> = ApiResponse {
            data: None,
            error_body: Some("nope".into()),
            status: 503,
            success: false,
            headers: HeaderMap::new(),
        };
        let err = resp.into_data().unwrap_err();
        assert_eq!(err.to_string(), "HTTP request failed: status 503: nope");
    }
}
