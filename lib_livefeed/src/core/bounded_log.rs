//! # Bounded Log
//!
//! An ordered, capacity-limited store with set semantics on the item key.
//!
//! ## Invariants
//! - `len() <= capacity()` after every call.
//! - Each key appears at most once; order is insertion order, not timestamp order.
//! - Overflow evicts from the front (oldest first).
//!
//! Keys of evicted items are forgotten, so an item that slid out of the window can
//! be admitted again. Memory stays bounded by `capacity` for both entries and index.
//!
//! The log itself is not synchronized. The feed controller keeps it behind a
//! mutex and performs each `append` as one critical section.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::core::message::Keyed;
use crate::error::{FeedError, FeedResult};

/// Capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 200;

/// # Bounded Log
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    index: HashSet<String>,
    capacity: usize,
}

impl<T: Keyed + Clone> BoundedLog<T> {
    /// Creates an empty log. A zero capacity is rejected.
    pub fn new(capacity: usize) -> FeedResult<Self> {
        if capacity == 0 {
            return Err(FeedError::Config("buffer capacity must be greater than zero".to_string()));
        }
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            index: HashSet::with_capacity(capacity),
            capacity,
        })
    }

    /// # Append
    ///
    /// Admits every candidate whose key is not already present (in the log or
    /// earlier in the same batch), in the given order, then trims the front until
    /// the log fits its capacity.
    ///
    /// # Returns
    /// The candidates actually admitted. An empty result means the log did not
    /// change and callers should not notify anyone.
    pub fn append<I>(&mut self, candidates: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        let mut appended = Vec::new();

        for candidate in candidates {
            if !self.index.insert(candidate.key().to_owned()) {
                continue;
            }
            self.entries.push_back(candidate.clone());
            appended.push(candidate);
        }

        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.index.remove(evicted.key());
            }
        }

        appended
    }

    /// Returns `true` if an item with `key` is currently held.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    /// Copies the current contents into an immutable, cheaply clonable snapshot.
    pub fn snapshot(&self) -> Arc<[T]> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::FeedMessage;

    fn msg(id: &str) -> FeedMessage {
        FeedMessage::new(id, "sender", format!("text {}", id), "00:00")
    }

    fn ids(log: &BoundedLog<FeedMessage>) -> Vec<String> {
        log.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(BoundedLog::<FeedMessage>::new(0), Err(FeedError::Config(_))));
    }

    #[test]
    fn overlapping_appends_keep_first_seen_order() {
        let mut log = BoundedLog::new(DEFAULT_CAPACITY).unwrap();
        log.append(vec![msg("a"), msg("b"), msg("c")]);
        let appended = log.append(vec![msg("b"), msg("d"), msg("a"), msg("e")]);

        assert_eq!(appended.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec!["d", "e"]);
        assert_eq!(ids(&log), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn duplicates_inside_one_batch_are_dropped() {
        let mut log = BoundedLog::new(10).unwrap();
        let appended = log.append(vec![msg("x"), msg("x"), msg("y")]);
        assert_eq!(appended.len(), 2);
        assert_eq!(ids(&log), vec!["x", "y"]);
    }

    #[test]
    fn fully_known_batch_appends_nothing() {
        let mut log = BoundedLog::new(10).unwrap();
        log.append(vec![msg("a"), msg("b")]);
        assert!(log.append(vec![msg("b"), msg("a")]).is_empty());
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn retains_last_200_of_250() {
        let mut log = BoundedLog::new(DEFAULT_CAPACITY).unwrap();
        for i in 0..250 {
            log.append(vec![msg(&format!("m{}", i))]);
            assert!(log.len() <= DEFAULT_CAPACITY);
        }

        let expected: Vec<String> = (50..250).map(|i| format!("m{}", i)).collect();
        assert_eq!(ids(&log), expected);
        assert!(!log.contains("m49"));
        assert!(log.contains("m50"));
    }

    #[test]
    fn oversized_batch_is_trimmed_to_its_tail() {
        let mut log = BoundedLog::new(3).unwrap();
        let batch: Vec<_> = (0..5).map(|i| msg(&i.to_string())).collect();
        log.append(batch);
        assert_eq!(ids(&log), vec!["2", "3", "4"]);
    }

    #[test]
    fn evicted_ids_can_return() {
        let mut log = BoundedLog::new(2).unwrap();
        log.append(vec![msg("a"), msg("b"), msg("c")]);
        assert!(!log.contains("a"));

        let appended = log.append(vec![msg("a")]);
        assert_eq!(appended.len(), 1);
        assert_eq!(ids(&log), vec!["c", "a"]);
    }

    #[test]
    fn identical_content_with_distinct_ids_is_retained() {
        let mut log = BoundedLog::new(10).unwrap();
        let a = FeedMessage::new("id-1", "ana", "same", "12:00");
        let b = FeedMessage::new("id-2", "ana", "same", "12:00");
        log.append(vec![a, b]);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn snapshot_is_detached_from_later_appends() {
        let mut log = BoundedLog::new(10).unwrap();
        log.append(vec![msg("a")]);
        let snap = log.snapshot();
        log.append(vec![msg("b")]);
        assert_eq!(snap.len(), 1);
        assert_eq!(log.len(), 2);
    }
}
