//! # Interval Poller
//!
//! Runs a caller-supplied tick on a fixed interval until stopped.
//!
//! ## Key Design Principles:
//! - **One Timer**: At most one poll loop exists per `Poller`. Calling `start`
//!   while a loop is alive is a no-op.
//! - **Immediate First Tick**: The first tick fires as soon as the loop starts, so
//!   a fallback from push to polling does not wait a full interval.
//! - **No Backoff**: A failing tick is the tick's business. The loop keeps its
//!   cadence and the next tick retries on its own.
//! - **Scoped Cancellation**: Each loop runs under a child of the caller's token,
//!   so cancelling the feed session stops the loop without a separate `stop`.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct PollTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// # Poller
pub struct Poller {
    period: Duration,
    task: Mutex<Option<PollTask>>,
}

impl Poller {
    /// Creates an idle poller ticking every `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            task: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// # Start
    ///
    /// Spawns the poll loop unless one is already running or `parent` is already
    /// cancelled. Must be called from within a tokio runtime.
    ///
    /// # Returns
    /// `true` if a new loop was spawned.
    pub fn start<F, Fut>(&self, parent: &CancellationToken, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|t| !t.handle.is_finished() && !t.cancel.is_cancelled()) {
            log::debug!("Poller already running; start ignored.");
            return false;
        }
        if parent.is_cancelled() {
            return false;
        }

        let cancel = parent.child_token();
        let token = cancel.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => tick().await,
                }
            }
            log::debug!("Poll loop exited.");
        });

        log::info!("Polling started (every {} ms).", period.as_millis());
        *slot = Some(PollTask { cancel, handle });
        true
    }

    /// Stops the loop, aborting an in-flight tick. Returns `true` if one was running.
    pub fn stop(&self) -> bool {
        match self.lock().take() {
            Some(task) => {
                task.cancel.cancel();
                task.handle.abort();
                log::info!("Polling stopped.");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished() && !t.cancel.is_cancelled())
    }

    fn lock(&self) -> MutexGuard<'_, Option<PollTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_tick(counter: &Arc<AtomicUsize>) -> impl Fn() -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_then_periodic() {
        let poller = Poller::new(Duration::from_millis(2000));
        let ticks = Arc::new(AtomicUsize::new(0));
        let session = CancellationToken::new();

        assert!(poller.start(&session, counting_tick(&ticks)));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(4000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_a_no_op() {
        let poller = Poller::new(Duration::from_millis(2000));
        let ticks = Arc::new(AtomicUsize::new(0));
        let session = CancellationToken::new();

        assert!(poller.start(&session, counting_tick(&ticks)));
        assert!(!poller.start(&session, counting_tick(&ticks)));

        tokio::time::sleep(Duration::from_millis(2001)).await;
        // One loop: the immediate tick plus one interval.
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_the_loop() {
        let poller = Poller::new(Duration::from_millis(100));
        let ticks = Arc::new(AtomicUsize::new(0));
        let session = CancellationToken::new();

        poller.start(&session, counting_tick(&ticks));
        tokio::time::sleep(Duration::from_millis(1)).await;
        session.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let after_cancel = ticks.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
        assert!(!poller.is_running());
        assert!(!poller.start(&session, counting_tick(&ticks)));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_spawns_a_new_loop() {
        let poller = Poller::new(Duration::from_millis(100));
        let ticks = Arc::new(AtomicUsize::new(0));
        let session = CancellationToken::new();

        poller.start(&session, counting_tick(&ticks));
        assert!(poller.stop());
        assert!(!poller.stop());
        assert!(poller.start(&session, counting_tick(&ticks)));
        assert!(poller.is_running());
    }
}
