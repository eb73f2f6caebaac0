//! # Transport Selector
//!
//! The state machine deciding whether the feed is served by the push connection
//! or by interval polling.
//!
//! ```text
//! Disconnected --Start--> Connecting --PushConnected--> PushActive
//!                              |                            |
//!                          PushFailed                   PushClosed
//!                              v                            v
//!                        PollingActive <--------------------+
//!                              |
//!                   PushConnected (opt-in re-probe only)
//!                              v
//!                          PushActive
//! ```
//!
//! `Stop` returns to `Disconnected` from anywhere. Events that make no sense in
//! the current state are ignored and yield no transition; the caller decides the
//! side effects (starting or stopping the poller) from the transition it gets back.

use tokio::sync::watch;

/// Operational states of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    /// Not started, or stopped.
    Disconnected,
    /// Push handshake in flight; neither transport is serving yet.
    Connecting,
    /// Updates arrive over the push connection. Polling is off.
    PushActive,
    /// Updates arrive by interval polling.
    PollingActive,
}

impl TransportState {
    /// `true` once one of the two transports is serving updates.
    pub fn is_serving(self) -> bool {
        matches!(self, Self::PushActive | Self::PollingActive)
    }
}

/// Inputs to the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    Start,
    PushConnected,
    PushFailed,
    PushClosed,
    Stop,
}

/// A state change produced by [`TransportSelector::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TransportState,
    pub to: TransportState,
}

/// # Transport Selector
///
/// Holds the current state and mirrors every change into a `watch` channel so
/// observers can await transitions without polling.
#[derive(Debug)]
pub struct TransportSelector {
    state: TransportState,
    tx: watch::Sender<TransportState>,
}

impl Default for TransportSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportSelector {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(TransportState::Disconnected);
        Self {
            state: TransportState::Disconnected,
            tx,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// A receiver that observes every future state change.
    pub fn watch(&self) -> watch::Receiver<TransportState> {
        self.tx.subscribe()
    }

    /// Feeds an event into the machine.
    ///
    /// # Returns
    /// `Some(Transition)` when the state changed, `None` when the event was ignored.
    pub fn apply(&mut self, event: TransportEvent) -> Option<Transition> {
        use TransportEvent as E;
        use TransportState as S;

        let next = match (self.state, event) {
            (S::Disconnected, E::Start) => S::Connecting,
            (S::Connecting, E::PushConnected) => S::PushActive,
            (S::Connecting, E::PushFailed) => S::PollingActive,
            (S::PushActive, E::PushClosed) => S::PollingActive,
            // A successful re-probe while degraded.
            (S::PollingActive, E::PushConnected) => S::PushActive,
            (S::Disconnected, E::Stop) => return None,
            (_, E::Stop) => S::Disconnected,
            _ => return None,
        };

        let transition = Transition { from: self.state, to: next };
        log::info!("Transport transition: {:?} -> {:?} (on {:?})", transition.from, next, event);
        self.state = next;
        self.tx.send_replace(next);
        Some(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransportEvent as E;
    use TransportState as S;

    fn run(events: &[TransportEvent]) -> TransportSelector {
        let mut selector = TransportSelector::new();
        for event in events {
            selector.apply(*event);
        }
        selector
    }

    #[test]
    fn happy_path_reaches_push() {
        assert_eq!(run(&[E::Start, E::PushConnected]).state(), S::PushActive);
    }

    #[test]
    fn failed_handshake_falls_back_to_polling() {
        assert_eq!(run(&[E::Start, E::PushFailed]).state(), S::PollingActive);
    }

    #[test]
    fn closed_push_falls_back_to_polling() {
        let mut selector = run(&[E::Start, E::PushConnected]);
        let t = selector.apply(E::PushClosed).unwrap();
        assert_eq!((t.from, t.to), (S::PushActive, S::PollingActive));
    }

    #[test]
    fn reprobe_success_returns_to_push() {
        assert_eq!(run(&[E::Start, E::PushFailed, E::PushConnected]).state(), S::PushActive);
    }

    #[test]
    fn irrelevant_events_are_ignored() {
        let mut selector = TransportSelector::new();
        assert!(selector.apply(E::PushConnected).is_none());
        assert!(selector.apply(E::Stop).is_none());

        let mut selector = run(&[E::Start, E::PushFailed]);
        assert!(selector.apply(E::PushFailed).is_none());
        assert!(selector.apply(E::PushClosed).is_none());
        assert!(selector.apply(E::Start).is_none());
        assert_eq!(selector.state(), S::PollingActive);
    }

    #[test]
    fn stop_returns_to_disconnected_from_any_active_state() {
        for prefix in [
            vec![E::Start],
            vec![E::Start, E::PushConnected],
            vec![E::Start, E::PushFailed],
        ] {
            let mut selector = run(&prefix);
            assert!(selector.apply(E::Stop).is_some());
            assert_eq!(selector.state(), S::Disconnected);
        }
    }

    #[test]
    fn watch_mirrors_state() {
        let mut selector = TransportSelector::new();
        let rx = selector.watch();
        selector.apply(E::Start);
        selector.apply(E::PushFailed);
        assert_eq!(*rx.borrow(), S::PollingActive);
        assert!(S::PollingActive.is_serving());
        assert!(!S::Connecting.is_serving());
    }
}
