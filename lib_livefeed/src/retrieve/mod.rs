//! # Data Retrieval Module
//!
//! HTTP plumbing shared by the remote backend: request building, bearer auth,
//! retries with exponential backoff, and JSON decoding.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: A generic HTTP `ApiClient` built on `reqwest` and
//!   `reqwest-middleware`.

/// Generic HTTP API client with retry middleware.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiResponse, HttpOptions};
