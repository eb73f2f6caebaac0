//! # Feed Controller
//!
//! Owns the message window, the view counters and the transport state of one
//! logical feed, and runs the tasks that keep them current.
//!
//! ## Workflow:
//! 1.  **Start**: a fresh window is installed, the selector moves to `Connecting`
//!     and a supervisor task attempts the push handshake (bounded by
//!     `push_connect_timeout`).
//! 2.  **Push**: on success every push event is appended as it arrives; polling,
//!     if it was running, is stopped.
//! 3.  **Fallback**: on handshake failure, or when an open push connection closes,
//!     polling starts immediately and runs every `poll_interval` until stop.
//! 4.  **Re-probe** (opt-in): while degraded, the push handshake is retried every
//!     `push_reprobe_interval`; polling continues until a probe succeeds.
//! 5.  **Stop**: the session token is cancelled inside the same critical sections
//!     that guard every mutation, then the poller and supervisor are torn down.
//!     A response that lands after that point finds a cancelled token and is
//!     discarded.
//!
//! One controller runs at most one session at a time. Independent feeds use
//! independent controllers; nothing here is global.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::configs::FeedConfig;
use crate::core::bounded_log::BoundedLog;
use crate::core::dispatcher::{Dispatcher, Subscription};
use crate::core::message::FeedMessage;
use crate::core::reconciler::{Confirmation, PendingIncrement, Reconciler, ViewEntry, ViewSnapshot};
use crate::core::transport::{TransportEvent, TransportSelector, TransportState, Transition};
use crate::error::{FeedError, FeedResult};
use crate::ingestors::poller::Poller;
use crate::ingestors::{FeedBackend, PushChannel, PushEvent};

/// Snapshot type handed to message listeners.
pub type MessageSnapshot = Arc<[FeedMessage]>;

/// Optimistic increment applied per view request.
const VIEW_INCREMENT: u64 = 1;

struct LogState {
    buffer: BoundedLog<FeedMessage>,
    snapshot: MessageSnapshot,
    version: u64,
}

struct ViewState {
    reconciler: Reconciler,
    version: u64,
}

/// State shared between the controller, its handle and its tasks.
pub(crate) struct FeedShared {
    log: Mutex<LogState>,
    views: Mutex<ViewState>,
    selector: Mutex<TransportSelector>,
    session: Mutex<Option<CancellationToken>>,
    poller: Poller,
    message_listeners: Arc<Dispatcher<MessageSnapshot>>,
    view_listeners: Arc<Dispatcher<ViewSnapshot>>,
}

impl FeedShared {
    fn new(config: &FeedConfig) -> FeedResult<Self> {
        let buffer = BoundedLog::new(config.buffer_capacity)?;
        Ok(Self {
            log: Mutex::new(LogState {
                snapshot: buffer.snapshot(),
                buffer,
                version: 0,
            }),
            views: Mutex::new(ViewState {
                reconciler: Reconciler::new(),
                version: 0,
            }),
            selector: Mutex::new(TransportSelector::new()),
            session: Mutex::new(None),
            poller: Poller::new(config.poll_interval()),
            message_listeners: Dispatcher::new(),
            view_listeners: Dispatcher::new(),
        })
    }

    /// # Ingest
    ///
    /// Appends `candidates` if `token` is still live. The liveness check and the
    /// append share one critical section with `halt`, so nothing lands after stop.
    ///
    /// # Returns
    /// How many messages were actually appended.
    pub(crate) fn ingest(&self, token: &CancellationToken, candidates: Vec<FeedMessage>) -> usize {
        let (version, snapshot, appended) = {
            let mut state = lock(&self.log);
            if token.is_cancelled() {
                log::debug!("Discarding {} message(s) delivered after stop.", candidates.len());
                return 0;
            }
            let appended = state.buffer.append(candidates).len();
            if appended == 0 {
                return 0;
            }
            state.version += 1;
            state.snapshot = state.buffer.snapshot();
            (state.version, Arc::clone(&state.snapshot), appended)
        };

        log::trace!("Appended {} message(s); window v{} holds {}", appended, version, snapshot.len());
        self.message_listeners.publish(version, &snapshot);
        appended
    }

    fn transition(&self, token: &CancellationToken, event: TransportEvent) -> Option<Transition> {
        let mut selector = lock(&self.selector);
        if token.is_cancelled() {
            return None;
        }
        selector.apply(event)
    }

    fn update_views<R>(&self, f: impl FnOnce(&mut Reconciler) -> (R, bool)) -> R {
        let (result, published) = {
            let mut state = lock(&self.views);
            let (result, changed) = f(&mut state.reconciler);
            if changed {
                state.version += 1;
                (result, Some((state.version, state.reconciler.snapshot())))
            } else {
                (result, None)
            }
        };
        if let Some((version, snapshot)) = published {
            self.view_listeners.publish(version, &snapshot);
        }
        result
    }

    fn confirm_view(&self, token: &CancellationToken, pending: &PendingIncrement, count: u64) -> ViewOutcome {
        // Checked under the views lock so a stop in between cannot be missed.
        self.update_views(|reconciler| {
            if token.is_cancelled() {
                return (ViewOutcome::Discarded, false);
            }
            match reconciler.confirm(pending, count) {
                Confirmation::Applied => (ViewOutcome::Confirmed(count), true),
                Confirmation::Stale => (ViewOutcome::Superseded, false),
            }
        })
    }

    /// Tears down one session. Safe to call more than once.
    ///
    /// The session slot is held throughout so no new session can be installed
    /// between cancelling the token and clearing the slot.
    fn halt(&self, token: &CancellationToken) {
        let mut session = lock(&self.session);
        {
            let _log = lock(&self.log);
            let _views = lock(&self.views);
            token.cancel();
        }
        self.poller.stop();
        lock(&self.selector).apply(TransportEvent::Stop);

        if session.as_ref().is_some_and(|current| current.is_cancelled()) {
            *session = None;
        }
    }

    fn current_token(&self) -> Option<CancellationToken> {
        lock(&self.session).as_ref().filter(|t| !t.is_cancelled()).cloned()
    }
}

/// How a view request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutcome {
    /// The server's count replaced the local one.
    Confirmed(u64),
    /// A newer confirmation for the same entity had already been applied.
    Superseded,
    /// The response arrived after the issuing session was stopped.
    Discarded,
    /// The server call failed; the optimistic value stands.
    Failed(String),
}

/// # Pending View
///
/// Returned by [`FeedController::request_view_increment`]. Dropping it is fine;
/// awaiting [`PendingView::settled`] tells how the request ended.
#[derive(Debug)]
pub struct PendingView {
    entity_id: String,
    optimistic: u64,
    handle: JoinHandle<ViewOutcome>,
}

impl PendingView {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The count shown right after the click.
    pub fn optimistic(&self) -> u64 {
        self.optimistic
    }

    pub async fn settled(self) -> ViewOutcome {
        self.handle
            .await
            .unwrap_or_else(|e| ViewOutcome::Failed(format!("view task ended abnormally: {}", e)))
    }
}

/// # Feed Handle
///
/// Proof of a running session. Pass it to [`FeedController::stop`], call
/// [`FeedHandle::stop`], or drop it; all three release the transports.
#[must_use = "dropping the handle stops the feed"]
pub struct FeedHandle {
    token: CancellationToken,
    shared: Arc<FeedShared>,
    supervisor: Option<JoinHandle<()>>,
}

impl FeedHandle {
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    fn shutdown(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            log::info!("Stopping live feed.");
            self.shared.halt(&self.token);
            supervisor.abort();
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("stopped", &self.token.is_cancelled())
            .finish()
    }
}

/// # Feed Controller
pub struct FeedController<B: FeedBackend> {
    backend: Arc<B>,
    config: FeedConfig,
    shared: Arc<FeedShared>,
}

#[cfg(feature = "ingestors")]
impl FeedController<crate::ingestors::RemoteBackend> {
    /// Builds a controller talking to the real backend described by `config`.
    pub fn remote(config: FeedConfig) -> FeedResult<Self> {
        let backend = crate::ingestors::RemoteBackend::from_config(&config)?;
        Self::new(backend, config)
    }
}

impl<B: FeedBackend> FeedController<B> {
    /// Creates an idle controller. `config` is validated here.
    pub fn new(backend: B, config: FeedConfig) -> FeedResult<Self> {
        config.validate()?;
        let shared = Arc::new(FeedShared::new(&config)?);
        Ok(Self {
            backend: Arc::new(backend),
            config,
            shared,
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// # Start
    ///
    /// Installs an empty window and begins transport selection. Must be called
    /// from within a tokio runtime.
    ///
    /// # Errors
    /// `FeedError::AlreadyRunning` if a session from this controller is live.
    pub fn start(&self) -> FeedResult<FeedHandle> {
        let mut session = lock(&self.shared.session);
        if session.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return Err(FeedError::AlreadyRunning);
        }

        let token = CancellationToken::new();

        // --- Phase 1: Fresh window for the new session ---
        let cleared = {
            let mut state = lock(&self.shared.log);
            let had_messages = !state.buffer.is_empty();
            state.buffer = BoundedLog::new(self.config.buffer_capacity)?;
            state.snapshot = state.buffer.snapshot();
            if had_messages {
                state.version += 1;
                Some((state.version, Arc::clone(&state.snapshot)))
            } else {
                None
            }
        };

        // --- Phase 2: Connecting ---
        lock(&self.shared.selector).apply(TransportEvent::Start);
        *session = Some(token.clone());
        drop(session);

        // Listeners run with no controller lock held; they may read state back.
        if let Some((version, snapshot)) = cleared {
            self.shared.message_listeners.publish(version, &snapshot);
        }

        // --- Phase 3: Supervisor ---
        let supervisor = tokio::spawn(run_transport(
            Arc::clone(&self.shared),
            Arc::clone(&self.backend),
            TransportTimings::from(&self.config),
            token.clone(),
        ));

        log::info!("Live feed started.");
        Ok(FeedHandle {
            token,
            shared: Arc::clone(&self.shared),
            supervisor: Some(supervisor),
        })
    }

    /// Releases the session's transports. Equivalent to `handle.stop()`.
    pub fn stop(&self, handle: FeedHandle) {
        handle.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.current_token().is_some()
    }

    /// # Subscribe
    ///
    /// `listener` is called with the full ordered window every time it changes.
    /// It is called with no controller lock held and may read controller state,
    /// but must not call [`start`](Self::start), which can publish a cleared window.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&MessageSnapshot) + Send + Sync + 'static,
    {
        self.shared.message_listeners.add_listener(listener)
    }

    /// Like [`subscribe`](Self::subscribe), for the view-counter map.
    ///
    /// The listener may read controller state, but must not change the view
    /// counters (e.g. call [`request_view_increment`](Self::request_view_increment)
    /// or [`seed_view_count`](Self::seed_view_count)): that would publish again on
    /// the dispatcher it is being called from and deadlock.
    pub fn subscribe_views<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ViewSnapshot) + Send + Sync + 'static,
    {
        self.shared.view_listeners.add_listener(listener)
    }

    /// # Request View Increment
    ///
    /// Bumps the entity's count and flash counter at once, then asks the server
    /// for the authoritative count in the background. Must be called from within
    /// a tokio runtime.
    pub fn request_view_increment(&self, entity_id: &str) -> PendingView {
        let pending = self.shared.update_views(|reconciler| {
            (reconciler.apply_view_increment(entity_id, VIEW_INCREMENT), true)
        });
        log::debug!("View +{} on '{}' (optimistic {})", VIEW_INCREMENT, entity_id, pending.optimistic());

        // Outside a session the confirmation is still applied; only a stopped
        // session's responses are discarded.
        let token = self.shared.current_token().unwrap_or_default();
        let shared = Arc::clone(&self.shared);
        let backend = Arc::clone(&self.backend);
        let optimistic = pending.optimistic();

        let handle = tokio::spawn(async move {
            match backend.post_view(pending.entity_id()).await {
                Ok(count) => {
                    let outcome = shared.confirm_view(&token, &pending, count);
                    log::debug!("View on '{}' settled: {:?}", pending.entity_id(), outcome);
                    outcome
                }
                Err(e) => {
                    log::warn!("{}. Keeping optimistic count.", e);
                    shared.update_views(|reconciler| {
                        reconciler.fail(&pending);
                        ((), false)
                    });
                    ViewOutcome::Failed(e.to_string())
                }
            }
        });

        PendingView {
            entity_id: entity_id.to_string(),
            optimistic,
            handle,
        }
    }

    /// Installs a known server count for an untracked entity (e.g. from a listing).
    pub fn seed_view_count(&self, entity_id: &str, count: u64) -> bool {
        self.shared.update_views(|reconciler| {
            let seeded = reconciler.seed(entity_id, count);
            (seeded, seeded)
        })
    }

    /// Current window, oldest first.
    pub fn messages(&self) -> MessageSnapshot {
        Arc::clone(&lock(&self.shared.log).snapshot)
    }

    pub fn view_counts(&self) -> ViewSnapshot {
        lock(&self.shared.views).reconciler.snapshot()
    }

    pub fn view(&self, entity_id: &str) -> Option<ViewEntry> {
        lock(&self.shared.views).reconciler.get(entity_id)
    }

    pub fn transport_state(&self) -> TransportState {
        lock(&self.shared.selector).state()
    }

    /// Receiver that wakes on every transport transition.
    pub fn transport_watch(&self) -> watch::Receiver<TransportState> {
        lock(&self.shared.selector).watch()
    }

    /// Whether the poll loop is currently alive.
    pub fn is_polling(&self) -> bool {
        self.shared.poller.is_running()
    }
}

/// Durations the supervisor needs, copied out of the config.
#[derive(Debug, Clone, Copy)]
struct TransportTimings {
    connect_timeout: Duration,
    reprobe_interval: Option<Duration>,
}

impl From<&FeedConfig> for TransportTimings {
    fn from(config: &FeedConfig) -> Self {
        Self {
            connect_timeout: config.push_connect_timeout(),
            reprobe_interval: config.push_reprobe_interval(),
        }
    }
}

enum PushOutcome {
    Cancelled,
    Closed(Option<String>),
}

/// # Transport Supervisor
///
/// Drives the selector for one session. Exits when the session token is cancelled.
async fn run_transport<B: FeedBackend>(
    shared: Arc<FeedShared>,
    backend: Arc<B>,
    timings: TransportTimings,
    token: CancellationToken,
) {
    loop {
        // --- Phase 1: Handshake (initial attempt or re-probe) ---
        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = tokio::time::timeout(timings.connect_timeout, backend.connect_push()) => {
                result.unwrap_or_else(|_| Err(FeedError::TransportSetup(format!(
                    "handshake timed out after {} ms",
                    timings.connect_timeout.as_millis()
                ))))
            }
        };

        match attempt {
            Ok(channel) => {
                if shared.transition(&token, TransportEvent::PushConnected).is_none() {
                    return;
                }
                shared.poller.stop();

                // --- Phase 2: Pump push events until closed ---
                match pump_push(&shared, channel, &token).await {
                    PushOutcome::Cancelled => return,
                    PushOutcome::Closed(reason) => {
                        log::warn!(
                            "Push connection closed ({}). Falling back to polling.",
                            reason.as_deref().unwrap_or("no reason given")
                        );
                        if shared.transition(&token, TransportEvent::PushClosed).is_some() {
                            start_polling(&shared, &backend, &token);
                        }
                    }
                }
            }
            Err(e) => {
                if shared.transition(&token, TransportEvent::PushFailed).is_some() {
                    log::warn!("Push unavailable: {}. Falling back to polling.", e);
                    start_polling(&shared, &backend, &token);
                } else {
                    log::debug!("Push re-probe failed: {}", e);
                }
            }
        }

        // --- Phase 3: Degraded; optionally wait for the next probe ---
        match timings.reprobe_interval {
            None => {
                token.cancelled().await;
                return;
            }
            Some(every) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(every) => log::info!("Re-probing push connection."),
                }
            }
        }
    }
}

async fn pump_push(shared: &FeedShared, mut channel: PushChannel, token: &CancellationToken) -> PushOutcome {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                channel.close();
                return PushOutcome::Cancelled;
            }
            event = channel.next() => match event {
                Some(PushEvent::Message(wire)) => {
                    shared.ingest(token, vec![FeedMessage::from(wire)]);
                }
                Some(PushEvent::Closed { reason }) => return PushOutcome::Closed(reason),
                None => return PushOutcome::Closed(None),
            }
        }
    }
}

fn start_polling<B: FeedBackend>(shared: &Arc<FeedShared>, backend: &Arc<B>, token: &CancellationToken) {
    let tick_shared = Arc::clone(shared);
    let backend = Arc::clone(backend);
    let session = token.clone();

    shared.poller.start(token, move || {
        let shared = Arc::clone(&tick_shared);
        let backend = Arc::clone(&backend);
        let session = session.clone();
        async move { poll_once(&shared, backend.as_ref(), &session).await }
    });
}

/// One poll cycle. Failures are logged and swallowed; the timer keeps going.
async fn poll_once<B: FeedBackend>(shared: &FeedShared, backend: &B, token: &CancellationToken) {
    match backend.fetch_recent().await {
        Ok(batch) => {
            let candidates: Vec<FeedMessage> = batch.into_iter().map(FeedMessage::from).collect();
            let fetched = candidates.len();
            let appended = shared.ingest(token, candidates);
            log::debug!("Poll fetched {} message(s), {} new.", fetched, appended);
        }
        Err(e) => log::warn!("{}. Retrying next tick.", e),
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
