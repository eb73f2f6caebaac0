//! # Snapshot Dispatcher
//!
//! Fans a snapshot out to every registered listener.
//!
//! ## Core Design Principles:
//!
//! 1.  **Shared Snapshots**: Listeners receive a reference to one snapshot value.
//!     For the message feed that value is an `Arc<[FeedMessage]>`, so keeping it
//!     costs a pointer clone, not a copy of the window.
//!
//! 2.  **Versioned Delivery**: Every publish carries a version taken inside the
//!     critical section that produced the snapshot. A version not newer than the
//!     last one delivered is dropped, so two racing publishers can never make a
//!     listener observe an older state after a newer one.
//!
//! 3.  **Re-entrancy**: The listener list is copied out before invoking anyone, so
//!     a listener may subscribe or unsubscribe from inside its own callback. It
//!     must not cause another publish on the same dispatcher, which would wait on
//!     the delivery lock it is running under.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// A registered callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// # Dispatcher
pub struct Dispatcher<T> {
    listeners: Mutex<Vec<(u64, Listener<T>)>>,
    next_id: AtomicU64,
    /// Highest version delivered so far. Held for the whole fan-out.
    delivered: Mutex<u64>,
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            delivered: Mutex::new(0),
        }
    }
}

impl<T: 'static> Dispatcher<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// # Add Listener
    ///
    /// Registers `listener` and returns the [`Subscription`] that detaches it.
    /// The listener is not called with the current state; it hears the next change.
    pub fn add_listener<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));
        log::debug!("Listener {} registered", id);

        let weak: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.remove_listener(id);
            }
        })
    }

    /// Removes a listener by id. Returns `false` if it was already gone.
    pub fn remove_listener(&self, id: u64) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        let removed = listeners.len() != before;
        if removed {
            log::debug!("Listener {} removed", id);
        }
        removed
    }

    /// # Publish
    ///
    /// Delivers `snapshot` to every listener unless a newer or equal `version` was
    /// already delivered.
    ///
    /// # Returns
    /// The number of listeners invoked.
    pub fn publish(&self, version: u64, snapshot: &T) -> usize {
        let mut delivered = lock(&self.delivered);
        if version <= *delivered {
            log::trace!("Dropping stale snapshot v{} (delivered v{})", version, *delivered);
            return 0;
        }
        *delivered = version;

        let targets: Vec<Listener<T>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &targets {
            listener(snapshot);
        }
        targets.len()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }
}

/// Handle returned by `subscribe`. Call [`Subscription::unsubscribe`] to detach.
///
/// Dropping the handle does not detach: a fire-and-forget listener stays
/// registered for the life of the dispatcher.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Stops further deliveries to the listener.
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

// A panicking listener must not wedge the feed for everyone else.
fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(&u32) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |v: &u32| sink.lock().unwrap().push(*v))
    }

    #[test]
    fn publishes_to_all_listeners() {
        let dispatcher = Dispatcher::<u32>::new();
        let (a, fa) = recorder();
        let (b, fb) = recorder();
        let _sa = dispatcher.add_listener(fa);
        let _sb = dispatcher.add_listener(fb);

        assert_eq!(dispatcher.publish(1, &7), 2);
        assert_eq!(*a.lock().unwrap(), vec![7]);
        assert_eq!(*b.lock().unwrap(), vec![7]);
    }

    #[test]
    fn stale_versions_are_dropped() {
        let dispatcher = Dispatcher::<u32>::new();
        let (seen, f) = recorder();
        let _s = dispatcher.add_listener(f);

        dispatcher.publish(2, &20);
        assert_eq!(dispatcher.publish(1, &10), 0);
        assert_eq!(dispatcher.publish(2, &21), 0);
        dispatcher.publish(3, &30);
        assert_eq!(*seen.lock().unwrap(), vec![20, 30]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let dispatcher = Dispatcher::<u32>::new();
        let (seen, f) = recorder();
        let sub = dispatcher.add_listener(f);

        dispatcher.publish(1, &1);
        sub.unsubscribe();
        dispatcher.publish(2, &2);

        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(dispatcher.listener_count(), 0);
    }

    #[test]
    fn dropping_subscription_keeps_listener() {
        let dispatcher = Dispatcher::<u32>::new();
        let (seen, f) = recorder();
        drop(dispatcher.add_listener(f));
        dispatcher.publish(1, &5);
        assert_eq!(*seen.lock().unwrap(), vec![5]);
    }

    #[test]
    fn listener_may_subscribe_from_inside_callback() {
        let dispatcher = Dispatcher::<u32>::new();
        let inner = Arc::clone(&dispatcher);
        let _s = dispatcher.add_listener(move |_| {
            let _nested = inner.add_listener(|_| {});
        });
        dispatcher.publish(1, &0);
        assert_eq!(dispatcher.listener_count(), 2);
    }
}
