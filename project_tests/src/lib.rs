//! # Project Tests
//!
//! Shared fixtures for the workspace integration tests in `tests/`. The main piece
//! is [`MockBackend`], an in-process `axum` server that speaks the same REST and
//! WebSocket protocol as a real feed backend and lets a test steer it.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod mock_backend;

pub use mock_backend::{eventually, MockBackend};
