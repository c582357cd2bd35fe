//! Reservation/session ownership indices
//!
//! Concurrent fast-path maps from reservation/session id to the pool that
//! currently owns it. Entries are registered exactly once per locally
//! successful Reserve/RemoteStart and unregistered exactly once per
//! successful Cancel/RemoteStop; both directions are compare-and-swap, never
//! blind overwrites. A negative lookup is advisory only; callers fall back
//! to scanning the pools' own stores, so a stale miss can never produce a
//! wrong "unknown" result.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::domain::identifiers::{
    EntityId, IdKind, PoolId, ReservationKind, SessionKind,
};

/// Concurrent `id → owning pool` map for one id kind.
pub struct OwnershipIndex<K: IdKind> {
    owners: DashMap<EntityId<K>, PoolId>,
}

/// Fast path for `CancelReservation`.
pub type ReservationIndex = OwnershipIndex<ReservationKind>;
/// Fast path for `RemoteStop`.
pub type SessionIndex = OwnershipIndex<SessionKind>;

impl<K: IdKind> OwnershipIndex<K> {
    pub fn new() -> Self {
        Self {
            owners: DashMap::new(),
        }
    }

    /// Record ownership. Returns false if the id is already registered;
    /// the existing entry is left untouched.
    pub fn register(&self, id: EntityId<K>, pool: PoolId) -> bool {
        match self.owners.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(pool);
                true
            }
        }
    }

    /// Drop ownership, returning the pool that held it.
    pub fn unregister(&self, id: &EntityId<K>) -> Option<PoolId> {
        self.owners.remove(id).map(|(_, pool)| pool)
    }

    /// O(1) owner lookup. `None` is advisory, not authoritative.
    pub fn resolve(&self, id: &EntityId<K>) -> Option<PoolId> {
        self.owners.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

impl<K: IdKind> Default for OwnershipIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReservationId;
    use std::sync::Arc;

    fn pool(n: u32) -> PoolId {
        PoolId::new(format!("DE*ABC*P{}", n)).unwrap()
    }

    #[test]
    fn register_resolve_unregister() {
        let index = ReservationIndex::new();
        let id = ReservationId::new("R-1").unwrap();

        assert!(index.register(id.clone(), pool(1)));
        assert_eq!(index.resolve(&id), Some(pool(1)));

        assert_eq!(index.unregister(&id), Some(pool(1)));
        assert_eq!(index.resolve(&id), None);
        assert!(index.is_empty());
    }

    #[test]
    fn register_never_overwrites() {
        let index = ReservationIndex::new();
        let id = ReservationId::new("R-1").unwrap();

        assert!(index.register(id.clone(), pool(1)));
        assert!(!index.register(id.clone(), pool(2)));
        assert_eq!(index.resolve(&id), Some(pool(1)));
    }

    #[test]
    fn unregister_missing_is_none() {
        let index = SessionIndex::new();
        let id = crate::domain::SessionId::new("S-404").unwrap();
        assert_eq!(index.unregister(&id), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_register_cancel_stays_consistent() {
        // After interleaved register/unregister on distinct ids, an id
        // resolves iff its last successful operation was a register.
        let index = Arc::new(ReservationIndex::new());
        let mut tasks = Vec::new();

        for n in 0..64u32 {
            let index = Arc::clone(&index);
            tasks.push(tokio::spawn(async move {
                let id = ReservationId::new(format!("R-{}", n)).unwrap();
                assert!(index.register(id.clone(), pool(n % 4)));
                if n % 2 == 0 {
                    assert!(index.unregister(&id).is_some());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for n in 0..64u32 {
            let id = ReservationId::new(format!("R-{}", n)).unwrap();
            if n % 2 == 0 {
                assert_eq!(index.resolve(&id), None);
            } else {
                assert_eq!(index.resolve(&id), Some(pool(n % 4)));
            }
        }
        assert_eq!(index.len(), 32);
    }
}
