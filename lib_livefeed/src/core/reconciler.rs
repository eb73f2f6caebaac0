//! # View Count Reconciler
//!
//! Owns per-entity view counters and flash counters.
//!
//! A click is applied locally at once (optimistic), then overwritten by whatever
//! the server reports (authoritative, even when lower). A failed confirmation
//! leaves the optimistic value in place; view counts are telemetry and are never
//! rolled back.
//!
//! Every optimistic apply takes a ticket. A confirmation carrying a ticket older
//! than one already confirmed for the same entity is discarded, so out-of-order
//! responses cannot replace a newer server reading with an older one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;

/// The renderer-facing state of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewEntry {
    /// Count currently shown (optimistic or confirmed).
    pub count: u64,
    /// Monotonic pulse counter. Each click bumps it so back-to-back clicks are
    /// distinguishable even while a previous highlight is still animating.
    pub flash: u64,
    /// `true` when `count` is the server's answer to the latest click.
    pub confirmed: bool,
}

/// Read-only map handed to view listeners, ordered by entity id.
pub type ViewSnapshot = Arc<BTreeMap<String, ViewEntry>>;

/// Receipt for one optimistic increment, presented back on confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIncrement {
    entity_id: String,
    ticket: u64,
    optimistic: u64,
}

impl PendingIncrement {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The count that was shown right after the click.
    pub fn optimistic(&self) -> u64 {
        self.optimistic
    }
}

/// Result of presenting a server count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The authoritative value replaced the local one.
    Applied,
    /// A newer confirmation for the entity was already applied.
    Stale,
}

#[derive(Debug, Default)]
struct EntityState {
    view: ViewEntry,
    latest_ticket: u64,
    confirmed_ticket: Option<u64>,
}

/// # Reconciler
#[derive(Debug, Default)]
pub struct Reconciler {
    entities: HashMap<String, EntityState>,
    next_ticket: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Apply View Increment
    ///
    /// Bumps the shown count by `optimistic_increment` and the flash counter by one,
    /// before any network round-trip.
    pub fn apply_view_increment(&mut self, entity_id: &str, optimistic_increment: u64) -> PendingIncrement {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let state = self.entities.entry(entity_id.to_string()).or_default();
        state.view.count = state.view.count.saturating_add(optimistic_increment);
        state.view.flash = state.view.flash.saturating_add(1);
        state.view.confirmed = false;
        state.latest_ticket = ticket;

        PendingIncrement {
            entity_id: entity_id.to_string(),
            ticket,
            optimistic: state.view.count,
        }
    }

    /// # Confirm
    ///
    /// Replaces the shown count with the server's value (server wins). The entry is
    /// marked confirmed only if no later click is still outstanding.
    pub fn confirm(&mut self, pending: &PendingIncrement, authoritative: u64) -> Confirmation {
        let state = self.entities.entry(pending.entity_id.clone()).or_default();

        if state.confirmed_ticket.is_some_and(|seen| seen > pending.ticket) {
            return Confirmation::Stale;
        }

        state.view.count = authoritative;
        state.confirmed_ticket = Some(pending.ticket);
        state.view.confirmed = pending.ticket >= state.latest_ticket;
        Confirmation::Applied
    }

    /// Records a failed confirmation. The optimistic value stays; returns the
    /// entry as it stands.
    pub fn fail(&mut self, pending: &PendingIncrement) -> Option<ViewEntry> {
        self.entities.get(&pending.entity_id).map(|s| s.view)
    }

    /// Installs a known server count for an entity that has no local state yet.
    /// Returns `false` (and changes nothing) if the entity is already tracked.
    pub fn seed(&mut self, entity_id: &str, count: u64) -> bool {
        if self.entities.contains_key(entity_id) {
            return false;
        }
        self.entities.insert(
            entity_id.to_string(),
            EntityState {
                view: ViewEntry { count, flash: 0, confirmed: true },
                ..EntityState::default()
            },
        );
        true
    }

    pub fn get(&self, entity_id: &str) -> Option<ViewEntry> {
        self.entities.get(entity_id).map(|s| s.view)
    }

    /// Flash counter for `entity_id`; zero for untracked entities.
    pub fn flash(&self, entity_id: &str) -> u64 {
        self.get(entity_id).map(|v| v.flash).unwrap_or(0)
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        Arc::new(
            self.entities
                .iter()
                .map(|(id, state)| (id.clone(), state.view))
                .collect(),
        )
    }
}
