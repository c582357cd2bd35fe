//! Charging station: owns a set of EVSEs

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::domain::{
    AdminStatus, AggregateStatus, EvseId, EvseStatus, PoolId, StationId, StatusSchedule,
};

use super::evse::Evse;
use super::index::{EntityIndex, MutationOutcome};
use crate::domain::identifiers::EvseKind;

/// A charging station: one physical site cabinet with 1..N EVSEs.
pub struct ChargingStation {
    id: StationId,
    pool_id: PoolId,
    evses: EntityIndex<StationId, EvseKind, Arc<Evse>>,
    admin_status: Mutex<StatusSchedule<AdminStatus>>,
    status: Mutex<StatusSchedule<AggregateStatus>>,
}

impl ChargingStation {
    pub fn new(id: StationId, pool_id: PoolId) -> Self {
        let evses = EntityIndex::new(id.clone());
        Self {
            id,
            pool_id,
            evses,
            admin_status: Mutex::new(StatusSchedule::new(AdminStatus::Operational)),
            status: Mutex::new(StatusSchedule::new(AggregateStatus::Unknown)),
        }
    }

    pub fn id(&self) -> &StationId {
        &self.id
    }

    pub fn pool_id(&self) -> &PoolId {
        &self.pool_id
    }

    /// The guarded EVSE collection.
    pub fn evses(&self) -> &EntityIndex<StationId, EvseKind, Arc<Evse>> {
        &self.evses
    }

    /// Create and add an EVSE through the vote/notify guard.
    pub fn create_evse(&self, evse_id: EvseId) -> MutationOutcome<Arc<Evse>> {
        let evse = Arc::new(Evse::new(evse_id.clone(), self.id.clone()));
        self.evses.add(Utc::now(), evse_id, evse)
    }

    pub fn evse(&self, id: &EvseId) -> Option<Arc<Evse>> {
        self.evses.get(id)
    }

    pub fn contains_evse(&self, id: &EvseId) -> bool {
        self.evses.contains(id)
    }

    /// First EVSE (in sorted-id order) ready for a new hold or session.
    /// Used when a request is addressed to the station as a whole. A
    /// station out of service offers nothing.
    pub fn first_available_evse(&self) -> Option<Arc<Evse>> {
        if !self.admin_status().is_operational() {
            return None;
        }
        self.evses
            .values_sorted()
            .into_iter()
            .find(|evse| evse.is_available())
    }

    // ─── Status ────────────────────────────────────────────────────────

    pub fn admin_status(&self) -> AdminStatus {
        self.admin_status
            .lock()
            .expect("admin status lock poisoned")
            .current_status()
    }

    pub fn set_admin_status(&self, status: AdminStatus) {
        self.admin_status
            .lock()
            .expect("admin status lock poisoned")
            .insert(status);
    }

    pub fn current_status(&self) -> AggregateStatus {
        self.status
            .lock()
            .expect("status lock poisoned")
            .current_status()
    }

    /// Recompute the aggregate from child EVSE statuses and record it.
    pub fn recompute_status(&self) -> AggregateStatus {
        let statuses: Vec<EvseStatus> = self
            .evses
            .values_sorted()
            .iter()
            .map(|evse| evse.current_status())
            .collect();
        let aggregate = aggregate_of(&statuses);
        self.status
            .lock()
            .expect("status lock poisoned")
            .insert(aggregate);
        aggregate
    }
}

fn aggregate_of(statuses: &[EvseStatus]) -> AggregateStatus {
    if statuses.is_empty() {
        return AggregateStatus::Unknown;
    }
    let available = statuses
        .iter()
        .filter(|s| matches!(s, EvseStatus::Available))
        .count();
    if available == statuses.len() {
        AggregateStatus::Available
    } else if available > 0 {
        AggregateStatus::PartiallyAvailable
    } else {
        AggregateStatus::Unavailable
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn station() -> ChargingStation {
        ChargingStation::new(
            StationId::new("DE*ABC*S1").unwrap(),
            PoolId::new("DE*ABC*P1").unwrap(),
        )
    }

    fn evse_id(n: u32) -> EvseId {
        EvseId::new(format!("DE*ABC*E{}", n)).unwrap()
    }

    #[test]
    fn create_and_lookup_evse() {
        let station = station();
        assert!(station.create_evse(evse_id(1)).is_committed());
        assert!(station.contains_evse(&evse_id(1)));
        assert_eq!(station.evses().len(), 1);
    }

    #[test]
    fn duplicate_evse_rejected() {
        let station = station();
        station.create_evse(evse_id(1));
        assert!(matches!(
            station.create_evse(evse_id(1)),
            MutationOutcome::Duplicate
        ));
    }

    #[test]
    fn first_available_prefers_lowest_id() {
        let station = station();
        for n in [2, 1, 3] {
            station.create_evse(evse_id(n));
        }
        let first = station.first_available_evse().unwrap();
        assert_eq!(first.id(), &evse_id(1));
    }

    #[test]
    fn aggregate_reflects_children() {
        let station = station();
        assert_eq!(station.recompute_status(), AggregateStatus::Unknown);

        station.create_evse(evse_id(1));
        station.create_evse(evse_id(2));
        let e1 = station.evse(&evse_id(1)).unwrap();
        let e2 = station.evse(&evse_id(2)).unwrap();

        e1.set_status(EvseStatus::Available, Utc::now());
        e2.set_status(EvseStatus::Available, Utc::now());
        assert_eq!(station.recompute_status(), AggregateStatus::Available);

        e2.set_status(EvseStatus::Charging, Utc::now());
        assert_eq!(station.recompute_status(), AggregateStatus::PartiallyAvailable);

        e1.set_status(EvseStatus::OutOfService, Utc::now());
        assert_eq!(station.recompute_status(), AggregateStatus::Unavailable);
    }
}
