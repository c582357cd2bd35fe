//! Keyed child-entity collection
//!
//! Each hierarchy level owns its children in an [`EntityIndex`]: a concurrent
//! map from typed identifier to entity, wired to a [`VotingNotificator`] pair
//! for addition and removal. All structural mutation goes through the
//! vote → mutate → notify sequence; the raw `try_add`/`try_remove` primitives
//! are compare-and-swap, never blind overwrites.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use chrono::{DateTime, Utc};

use crate::domain::identifiers::{EntityId, IdKind};

use super::voting::{Vote, VotingNotificator};

/// Result of a guarded add/remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome<V> {
    /// The change committed; for removal this carries the evicted entity.
    Committed(V),
    /// A voter vetoed; nothing was mutated, nothing was notified.
    Vetoed(String),
    /// Add: the id is already present (no overwrite).
    Duplicate,
    /// Remove: no such id.
    Missing,
}

impl<V> MutationOutcome<V> {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }

    /// The committed entity, if the mutation went through.
    pub fn into_committed(self) -> Option<V> {
        match self {
            Self::Committed(entity) => Some(entity),
            _ => None,
        }
    }
}

/// Concurrent child collection for one hierarchy level.
///
/// `P` is the owning parent's identifier type, `K` the child id kind and
/// `V` the child entity (typically an `Arc`).
pub struct EntityIndex<P, K: IdKind, V> {
    parent: P,
    children: DashMap<EntityId<K>, V>,
    addition: VotingNotificator<P, V>,
    removal: VotingNotificator<P, V>,
}

impl<P: Clone, K: IdKind, V: Clone> EntityIndex<P, K, V> {
    pub fn new(parent: P) -> Self {
        Self {
            parent,
            children: DashMap::new(),
            addition: VotingNotificator::new(),
            removal: VotingNotificator::new(),
        }
    }

    /// The vote/notify pair guarding additions.
    pub fn on_addition(&self) -> &VotingNotificator<P, V> {
        &self.addition
    }

    /// The vote/notify pair guarding removals.
    pub fn on_removal(&self) -> &VotingNotificator<P, V> {
        &self.removal
    }

    // ─── Raw primitives (callers must hold an approved vote) ───────────

    /// Insert iff absent. Returns false when the id is already present.
    pub fn try_add(&self, id: EntityId<K>, entity: V) -> bool {
        match self.children.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(entity);
                true
            }
        }
    }

    /// Remove and return the entity, if present.
    pub fn try_remove(&self, id: &EntityId<K>) -> Option<V> {
        self.children.remove(id).map(|(_, entity)| entity)
    }

    pub fn get(&self, id: &EntityId<K>) -> Option<V> {
        self.children.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &EntityId<K>) -> bool {
        self.children.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Child ids, sorted ascending for deterministic listings.
    pub fn ids(&self) -> Vec<EntityId<K>> {
        let mut ids: Vec<_> = self.children.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Children sorted by id.
    pub fn values_sorted(&self) -> Vec<V> {
        let mut entries: Vec<_> = self
            .children
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, v)| v).collect()
    }

    // ─── Guarded mutation ──────────────────────────────────────────────

    /// Vote, insert, notify.
    pub fn add(&self, timestamp: DateTime<Utc>, id: EntityId<K>, entity: V) -> MutationOutcome<V> {
        if let Vote::Vetoed(reason) = self.addition.send_voting(timestamp, &self.parent, &entity) {
            return MutationOutcome::Vetoed(reason);
        }
        if !self.try_add(id, entity.clone()) {
            return MutationOutcome::Duplicate;
        }
        self.addition
            .send_notification(timestamp, &self.parent, &entity);
        MutationOutcome::Committed(entity)
    }

    /// Vote, remove, notify.
    pub fn remove(&self, timestamp: DateTime<Utc>, id: &EntityId<K>) -> MutationOutcome<V> {
        let Some(candidate) = self.get(id) else {
            return MutationOutcome::Missing;
        };
        if let Vote::Vetoed(reason) = self.removal.send_voting(timestamp, &self.parent, &candidate) {
            return MutationOutcome::Vetoed(reason);
        }
        let Some(removed) = self.try_remove(id) else {
            // Lost a race with a concurrent removal.
            return MutationOutcome::Missing;
        };
        self.removal
            .send_notification(timestamp, &self.parent, &removed);
        MutationOutcome::Committed(removed)
    }
}

// ── Tests ──────────────────────────────────────────────────────
