//! # Mock Feed Backend
//!
//! Serves:
//! - `GET /feed/recent`: the configured message array (or 500 while failing).
//! - `POST /entities/{id}/view`: bumps and returns the entity's count.
//! - `GET /feed/stream`: WebSocket push, refused with 503 while push is disabled.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lib_livefeed::FeedConfig;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
enum PushCommand {
    Frame(String),
    Close(String),
}

struct MockInner {
    recent: Mutex<Vec<Value>>,
    views: Mutex<HashMap<String, u64>>,
    polls: AtomicUsize,
    fail_recent: AtomicBool,
    push_enabled: AtomicBool,
    push_clients: AtomicUsize,
    push_tx: broadcast::Sender<PushCommand>,
}

#[derive(Clone)]
struct MockState(Arc<MockInner>);

/// # Mock Backend
///
/// Listens on an ephemeral localhost port until dropped.
pub struct MockBackend {
    addr: SocketAddr,
    state: MockState,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> anyhow::Result<Self> {
        let (push_tx, _) = broadcast::channel(64);
        let state = MockState(Arc::new(MockInner {
            recent: Mutex::new(Vec::new()),
            views: Mutex::new(HashMap::new()),
            polls: AtomicUsize::new(0),
            fail_recent: AtomicBool::new(false),
            push_enabled: AtomicBool::new(true),
            push_clients: AtomicUsize::new(0),
            push_tx,
        }));

        let app = Router::new()
            .route("/feed/recent", get(recent))
            .route("/entities/{id}/view", post(view))
            .route("/feed/stream", get(stream))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("mock backend stopped: {}", e);
            }
        });

        Ok(Self { addr, state, server })
    }

    /// A config pointing at this server, with a short poll interval.
    pub fn config(&self) -> FeedConfig {
        FeedConfig {
            base_url: format!("http://{}/", self.addr),
            push_url: format!("ws://{}/feed/stream", self.addr),
            poll_interval_ms: 100,
            push_connect_timeout_ms: 2000,
            http_timeout_ms: 2000,
            ..FeedConfig::default()
        }
    }

    pub fn set_recent(&self, messages: Vec<Value>) {
        *self.state.0.recent.lock().unwrap() = messages;
    }

    pub fn set_views(&self, entity_id: &str, count: u64) {
        self.state.0.views.lock().unwrap().insert(entity_id.to_string(), count);
    }

    pub fn fail_recent(&self, fail: bool) {
        self.state.0.fail_recent.store(fail, Ordering::SeqCst);
    }

    pub fn enable_push(&self, enabled: bool) {
        self.state.0.push_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Number of `GET /feed/recent` calls served so far.
    pub fn polls(&self) -> usize {
        self.state.0.polls.load(Ordering::SeqCst)
    }

    pub fn push_clients(&self) -> usize {
        self.state.0.push_clients.load(Ordering::SeqCst)
    }

    /// Sends one text frame to every connected push client.
    pub fn push(&self, message: Value) {
        let _ = self.state.0.push_tx.send(PushCommand::Frame(message.to_string()));
    }

    /// Sends a raw text frame, e.g. something that is not a message at all.
    pub fn push_raw(&self, frame: &str) {
        let _ = self.state.0.push_tx.send(PushCommand::Frame(frame.to_string()));
    }

    /// Closes every push connection with a close frame carrying `reason`.
    pub fn close_push(&self, reason: &str) {
        let _ = self.state.0.push_tx.send(PushCommand::Close(reason.to_string()));
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn recent(State(state): State<MockState>) -> Response {
    state.0.polls.fetch_add(1, Ordering::SeqCst);
    if state.0.fail_recent.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "feed unavailable").into_response();
    }
    let messages = state.0.recent.lock().unwrap().clone();
    Json(Value::Array(messages)).into_response()
}

async fn view(State(state): State<MockState>, Path(id): Path<String>) -> Json<Value> {
    let count = {
        let mut views = state.0.views.lock().unwrap();
        let count = views.entry(id).or_insert(0);
        *count += 1;
        *count
    };
    Json(json!({ "viewCount": count }))
}

async fn stream(State(state): State<MockState>, ws: WebSocketUpgrade) -> Response {
    if !state.0.push_enabled.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "push disabled").into_response();
    }
    ws.on_upgrade(move |socket| serve_push(socket, state))
}

async fn serve_push(mut socket: WebSocket, state: MockState) {
    let mut commands = state.0.push_tx.subscribe();
    state.0.push_clients.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(PushCommand::Frame(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Ok(PushCommand::Close(reason)) => {
                    let frame = CloseFrame { code: 1001, reason: reason.into() };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.0.push_clients.fetch_sub(1, Ordering::SeqCst);
}

/// Polls `condition` every 10 ms until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
