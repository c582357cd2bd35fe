//! Charging pool: owns stations and runs the pool-level dispatcher
//!
//! A pool repeats the operator's remote-first/local-fallback protocol one
//! level down: an optional pool back-end gets the first attempt, then the
//! request is resolved through the station index to a concrete EVSE. The
//! pool also keeps its own reservation and session stores; these are the
//! slow-path truth the operator scans when its ownership indices miss.

use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;

use crate::domain::identifiers::StationKind;
use crate::domain::{
    AdminStatus, AggregateStatus, CancellationReason, ChargeDetailRecord, ChargingReservation,
    ChargingSession, ChargingTarget, DispatchResult, DispatchStatus, EvseId, EvseStatus,
    OperatorId, PoolId, ReservationId, SessionId, StationId, StatusSchedule, StopReason,
};
use crate::dispatch::{remote_first, RemoteOperatorBackend, ReserveRequest, StartRequest};

use super::evse::Evse;
use super::index::{EntityIndex, MutationOutcome};
use super::station::ChargingStation;

/// A charging pool: one location with 1..N stations.
pub struct ChargingPool {
    id: PoolId,
    operator_id: OperatorId,
    stations: EntityIndex<PoolId, StationKind, Arc<ChargingStation>>,
    /// Pool-local reservation store (slow-path truth)
    reservations: DashMap<ReservationId, ChargingReservation>,
    /// Pool-local session store (slow-path truth)
    sessions: DashMap<SessionId, ChargingSession>,
    remote: RwLock<Option<Arc<dyn RemoteOperatorBackend>>>,
    remote_timeout: std::time::Duration,
    admin_status: Mutex<StatusSchedule<AdminStatus>>,
    status: Mutex<StatusSchedule<AggregateStatus>>,
}

impl ChargingPool {
    pub fn new(id: PoolId, operator_id: OperatorId) -> Self {
        Self::with_timeout(id, operator_id, crate::config::Config::default().remote_timeout)
    }

    /// Build a pool whose remote attempts run under `remote_timeout`. The
    /// owning operator passes its configured timeout down here.
    pub fn with_timeout(
        id: PoolId,
        operator_id: OperatorId,
        remote_timeout: std::time::Duration,
    ) -> Self {
        let stations = EntityIndex::new(id.clone());
        Self {
            id,
            operator_id,
            stations,
            reservations: DashMap::new(),
            sessions: DashMap::new(),
            remote: RwLock::new(None),
            remote_timeout,
            admin_status: Mutex::new(StatusSchedule::new(AdminStatus::Operational)),
            status: Mutex::new(StatusSchedule::new(AggregateStatus::Unknown)),
        }
    }

    pub fn id(&self) -> &PoolId {
        &self.id
    }

    pub fn remote_timeout(&self) -> std::time::Duration {
        self.remote_timeout
    }

    pub fn operator_id(&self) -> &OperatorId {
        &self.operator_id
    }

    /// Attach a pool-level remote back-end. Rarely present; when it is, it
    /// gets the first attempt exactly like the operator's back-end.
    pub fn set_remote_backend(&self, backend: Arc<dyn RemoteOperatorBackend>) {
        *self.remote.write().expect("remote lock poisoned") = Some(backend);
    }

    fn remote_backend(&self) -> Option<Arc<dyn RemoteOperatorBackend>> {
        self.remote.read().expect("remote lock poisoned").clone()
    }

    // ─── Structure ─────────────────────────────────────────────────────

    pub fn stations(&self) -> &EntityIndex<PoolId, StationKind, Arc<ChargingStation>> {
        &self.stations
    }

    /// Create and add a station through the vote/notify guard.
    pub fn create_station(&self, station_id: StationId) -> MutationOutcome<Arc<ChargingStation>> {
        let station = Arc::new(ChargingStation::new(station_id.clone(), self.id.clone()));
        self.stations.add(Utc::now(), station_id, station)
    }

    pub fn station(&self, id: &StationId) -> Option<Arc<ChargingStation>> {
        self.stations.get(id)
    }

    pub fn contains_station(&self, id: &StationId) -> bool {
        self.stations.contains(id)
    }

    pub fn find_evse(&self, id: &EvseId) -> Option<Arc<Evse>> {
        self.stations
            .values_sorted()
            .into_iter()
            .find_map(|station| station.evse(id))
    }

    pub fn contains_evse(&self, id: &EvseId) -> bool {
        self.stations
            .values_sorted()
            .iter()
            .any(|station| station.contains_evse(id))
    }

    /// Whether a reserve/start addressed to `target` lands inside this pool.
    pub fn owns_target(&self, target: &ChargingTarget) -> bool {
        match target {
            ChargingTarget::Evse(id) => self.contains_evse(id),
            ChargingTarget::Station(id) => self.contains_station(id),
            ChargingTarget::Pool(id) => id == &self.id,
        }
    }

    /// Whether this pool holds the reservation, store or EVSE-side.
    pub fn has_reservation(&self, id: &ReservationId) -> bool {
        self.reservations.contains_key(id) || self.evse_holding_reservation(id).is_some()
    }

    /// Whether this pool holds the session, store or EVSE-side.
    pub fn has_session(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id) || self.evse_running_session(id).is_some()
    }

    pub fn reservation(&self, id: &ReservationId) -> Option<ChargingReservation> {
        self.reservations.get(id).map(|r| r.clone())
    }

    pub fn session(&self, id: &SessionId) -> Option<ChargingSession> {
        self.sessions.get(id).map(|s| s.clone())
    }

    pub fn active_reservation_count(&self) -> usize {
        self.reservations.len()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    // ─── Dispatch ──────────────────────────────────────────────────────

    /// Reserve inside this pool (remote-first when a pool back-end exists).
    pub async fn reserve(&self, request: ReserveRequest) -> DispatchResult<ChargingReservation> {
        let remote = self
            .remote_backend()
            .map(|backend| {
                let request = request.clone();
                async move { backend.reserve(request).await }
            });
        remote_first("reserve", remote, self.remote_timeout, || async {
            self.reserve_local(request)
        })
        .await
    }

    fn reserve_local(&self, request: ReserveRequest) -> DispatchResult<ChargingReservation> {
        if !self.admin_status().is_operational() {
            return DispatchResult::local(DispatchStatus::OutOfService);
        }
        let evse = match self.resolve_target(&request.target) {
            Ok(evse) => evse,
            Err(status) => return DispatchResult::local(status),
        };
        if let Some(expired) = evse.sweep_expired(Utc::now()) {
            self.reservations.remove(&expired.id);
        }

        let mut reservation = ChargingReservation::new(
            ReservationId::random("R-"),
            request.target.clone(),
            evse.id().clone(),
            request.provider_id.clone(),
            request.duration,
        );
        reservation.linked_reservation = request.linked_reservation.clone();

        match evse.reserve(reservation.clone()) {
            DispatchStatus::Success => {
                info!(reservation = %reservation.id, evse = %evse.id(), "Reservation placed");
                self.reservations
                    .insert(reservation.id.clone(), reservation.clone());
                DispatchResult::local_success(reservation)
            }
            status => DispatchResult::local(status),
        }
    }

    /// Cancel a reservation held in this pool.
    pub async fn cancel_reservation(
        &self,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> DispatchResult<()> {
        let remote = self.remote_backend().map(|backend| {
            let id = reservation_id.clone();
            async move { backend.cancel_reservation(&id, reason).await }
        });
        remote_first("cancel_reservation", remote, self.remote_timeout, || async {
            self.cancel_reservation_local(reservation_id, reason)
        })
        .await
    }

    fn cancel_reservation_local(
        &self,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> DispatchResult<()> {
        // Fast path through the store; fall back to scanning EVSEs so a
        // stale store never yields a wrong "unknown reservation".
        let evse = self
            .reservation(reservation_id)
            .and_then(|r| self.find_evse(&r.evse_id))
            .or_else(|| self.evse_holding_reservation(reservation_id));

        let Some(evse) = evse else {
            return DispatchResult::local(DispatchStatus::UnknownReservation);
        };
        match evse.cancel_reservation(reservation_id, reason) {
            Ok(cancelled) => {
                info!(reservation = %cancelled.id, reason = %reason, "Reservation cancelled");
                self.reservations.remove(reservation_id);
                DispatchResult::local_success(())
            }
            Err(status) => DispatchResult::local(status),
        }
    }

    /// Start a session inside this pool.
    pub async fn remote_start(&self, request: StartRequest) -> DispatchResult<ChargingSession> {
        let remote = self.remote_backend().map(|backend| {
            let request = request.clone();
            async move { backend.remote_start(request).await }
        });
        remote_first("remote_start", remote, self.remote_timeout, || async {
            self.remote_start_local(request)
        })
        .await
    }

    fn remote_start_local(&self, request: StartRequest) -> DispatchResult<ChargingSession> {
        if !self.admin_status().is_operational() {
            return DispatchResult::local(DispatchStatus::OutOfService);
        }
        // A referenced reservation pins the start to the EVSE holding it.
        let evse = match &request.reservation_id {
            Some(reservation_id) => self
                .reservation(reservation_id)
                .and_then(|r| self.find_evse(&r.evse_id))
                .or_else(|| self.evse_holding_reservation(reservation_id))
                .ok_or(DispatchStatus::UnknownReservation),
            None => self.resolve_target(&request.target),
        };
        let evse = match evse {
            Ok(evse) => evse,
            Err(status) => return DispatchResult::local(status),
        };
        if let Some(expired) = evse.sweep_expired(Utc::now()) {
            self.reservations.remove(&expired.id);
        }

        match evse.start_session(
            SessionId::random("S-"),
            request.provider_id.clone(),
            request.reservation_id.clone(),
        ) {
            Ok(session) => {
                info!(session = %session.id, evse = %evse.id(), "Session started");
                if let Some(consumed) = &session.reservation_id {
                    self.reservations.remove(consumed);
                }
                self.sessions.insert(session.id.clone(), session.clone());
                DispatchResult::local_success(session)
            }
            Err(status) => DispatchResult::local(status),
        }
    }

    /// Stop a session running in this pool.
    pub async fn remote_stop(&self, session_id: &SessionId) -> DispatchResult<ChargeDetailRecord> {
        let remote = self.remote_backend().map(|backend| {
            let id = session_id.clone();
            async move { backend.remote_stop(&id).await }
        });
        remote_first("remote_stop", remote, self.remote_timeout, || async {
            self.remote_stop_local(session_id)
        })
        .await
    }

    fn remote_stop_local(&self, session_id: &SessionId) -> DispatchResult<ChargeDetailRecord> {
        let evse = self
            .session(session_id)
            .and_then(|s| self.find_evse(&s.evse_id))
            .or_else(|| self.evse_running_session(session_id));

        let Some(evse) = evse else {
            return DispatchResult::local(DispatchStatus::InvalidSessionId);
        };
        match evse.stop_session(session_id, StopReason::Remote) {
            Ok(cdr) => {
                info!(session = %cdr.session_id, energy_wh = cdr.energy_wh, "Session stopped");
                self.sessions.remove(session_id);
                DispatchResult::local_success(cdr)
            }
            Err(status) => DispatchResult::local(status),
        }
    }

    /// Drop every lapsed reservation, returning the cleared ids so the
    /// operator can purge its ownership index.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<ReservationId> {
        let mut swept = Vec::new();
        for station in self.stations.values_sorted() {
            for evse in station.evses().values_sorted() {
                if let Some(expired) = evse.sweep_expired(now) {
                    self.reservations.remove(&expired.id);
                    swept.push(expired.id);
                }
            }
        }
        // Store entries whose EVSE vanished still expire.
        let orphaned: Vec<ReservationId> = self
            .reservations
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();
        for id in orphaned {
            self.reservations.remove(&id);
            swept.push(id);
        }
        swept
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

    /// Recompute the pool aggregate from every EVSE below it.
    pub fn recompute_status(&self) -> AggregateStatus {
        let mut statuses = Vec::new();
        for station in self.stations.values_sorted() {
            station.recompute_status();
            for evse in station.evses().values_sorted() {
                statuses.push(evse.current_status());
            }
        }
        let aggregate = if statuses.is_empty() {
            AggregateStatus::Unknown
        } else {
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
        };
        self.status
            .lock()
            .expect("status lock poisoned")
            .insert(aggregate);
        aggregate
    }

    // ─── Resolution helpers ────────────────────────────────────────────

    fn resolve_target(&self, target: &ChargingTarget) -> Result<Arc<Evse>, DispatchStatus> {
        match target {
            ChargingTarget::Evse(id) => {
                let Some(station) = self.station_of_evse(id) else {
                    return Err(DispatchStatus::UnknownEvse);
                };
                if !station.admin_status().is_operational() {
                    return Err(DispatchStatus::OutOfService);
                }
                station.evse(id).ok_or(DispatchStatus::UnknownEvse)
            }
            ChargingTarget::Station(id) => match self.station(id) {
                Some(station) if !station.admin_status().is_operational() => {
                    Err(DispatchStatus::OutOfService)
                }
                Some(station) => station
                    .first_available_evse()
                    .ok_or(DispatchStatus::UnknownEvse),
                None => Err(DispatchStatus::UnknownStation),
            },
            ChargingTarget::Pool(id) => {
                if id != &self.id {
                    return Err(DispatchStatus::UnknownPool);
                }
                self.first_available_evse().ok_or(DispatchStatus::UnknownEvse)
            }
        }
    }

    fn first_available_evse(&self) -> Option<Arc<Evse>> {
        self.stations
            .values_sorted()
            .into_iter()
            .find_map(|station| station.first_available_evse())
    }

    fn station_of_evse(&self, id: &EvseId) -> Option<Arc<ChargingStation>> {
        self.stations
            .values_sorted()
            .into_iter()
            .find(|station| station.contains_evse(id))
    }

    fn evse_holding_reservation(&self, id: &ReservationId) -> Option<Arc<Evse>> {
        self.stations.values_sorted().into_iter().find_map(|station| {
            station
                .evses()
                .values_sorted()
                .into_iter()
                .find(|evse| evse.active_reservation().is_some_and(|r| &r.id == id))
        })
    }

    fn evse_running_session(&self, id: &SessionId) -> Option<Arc<Evse>> {
        self.stations.values_sorted().into_iter().find_map(|station| {
            station
                .evses()
                .values_sorted()
                .into_iter()
                .find(|evse| evse.active_session().is_some_and(|s| &s.id == id))
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pool() -> ChargingPool {
        let pool = ChargingPool::new(
            PoolId::new("DE*ABC*P1").unwrap(),
            OperatorId::new("DE*ABC").unwrap(),
        );
        let station = pool
            .create_station(StationId::new("DE*ABC*S1").unwrap())
            .into_committed()
            .unwrap();
        station.create_evse(EvseId::new("DE*ABC*E1").unwrap());
        station.create_evse(EvseId::new("DE*ABC*E2").unwrap());
        pool
    }

    fn reserve_request(target: ChargingTarget) -> ReserveRequest {
        ReserveRequest {
            target,
            provider_id: None,
            duration: Duration::minutes(30),
            linked_reservation: None,
        }
    }

    #[tokio::test]
    async fn reserve_records_in_local_store() {
        let pool = pool();
        let evse_id = EvseId::new("DE*ABC*E1").unwrap();
        let result = pool
            .reserve(reserve_request(ChargingTarget::Evse(evse_id.clone())))
            .await;
        assert!(result.is_success());

        let reservation = result.payload.unwrap();
        assert_eq!(reservation.evse_id, evse_id);
        assert!(pool.has_reservation(&reservation.id));
        assert_eq!(pool.active_reservation_count(), 1);
    }

    #[tokio::test]
    async fn reserve_unknown_evse() {
        let pool = pool();
        let result = pool
            .reserve(reserve_request(ChargingTarget::Evse(
                EvseId::new("DE*ABC*E9").unwrap(),
            )))
            .await;
        assert_eq!(result.status, DispatchStatus::UnknownEvse);
    }

    #[tokio::test]
    async fn pool_addressed_reserve_picks_first_available() {
        let pool = pool();
        let result = pool
            .reserve(reserve_request(ChargingTarget::Pool(pool.id().clone())))
            .await;
        assert!(result.is_success());
        assert_eq!(
            result.payload.unwrap().evse_id,
            EvseId::new("DE*ABC*E1").unwrap()
        );

        // Second pool-level reserve lands on the next EVSE.
        let second = pool
            .reserve(reserve_request(ChargingTarget::Pool(pool.id().clone())))
            .await;
        assert_eq!(
            second.payload.unwrap().evse_id,
            EvseId::new("DE*ABC*E2").unwrap()
        );
    }

    #[tokio::test]
    async fn cancel_tolerates_stale_store() {
        let pool = pool();
        let result = pool
            .reserve(reserve_request(ChargingTarget::Pool(pool.id().clone())))
            .await;
        let reservation = result.payload.unwrap();

        // Drop the store entry behind the dispatcher's back: the scan
        // fallback must still find the hold on the EVSE.
        pool.reservations.remove(&reservation.id);
        let cancel = pool
            .cancel_reservation(&reservation.id, CancellationReason::UserRequest)
            .await;
        assert!(cancel.is_success());
    }

    #[tokio::test]
    async fn start_and_stop_roundtrip() {
        let pool = pool();
        let start = pool
            .remote_start(StartRequest {
                target: ChargingTarget::Pool(pool.id().clone()),
                provider_id: None,
                reservation_id: None,
            })
            .await;
        assert!(start.is_success());
        let session = start.payload.unwrap();
        assert_eq!(pool.active_session_count(), 1);

        let stop = pool.remote_stop(&session.id).await;
        assert!(stop.is_success());
        assert_eq!(stop.payload.unwrap().session_id, session.id);
        assert_eq!(pool.active_session_count(), 0);
    }

    #[tokio::test]
    async fn stop_unknown_session() {
        let pool = pool();
        let result = pool.remote_stop(&SessionId::new("S-404").unwrap()).await;
        assert_eq!(result.status, DispatchStatus::InvalidSessionId);
    }

    #[tokio::test]
    async fn start_consumes_reservation_and_store_entry() {
        let pool = pool();
        let evse_id = EvseId::new("DE*ABC*E1").unwrap();
        let reservation = pool
            .reserve(reserve_request(ChargingTarget::Evse(evse_id.clone())))
            .await
            .payload
            .unwrap();

        let start = pool
            .remote_start(StartRequest {
                target: ChargingTarget::Evse(evse_id),
                provider_id: None,
                reservation_id: Some(reservation.id.clone()),
            })
            .await;
        assert!(start.is_success());
        assert!(!pool.has_reservation(&reservation.id));
        assert_eq!(pool.active_reservation_count(), 0);
    }

    #[tokio::test]
    async fn station_out_of_service_blocks_reserve_and_start() {
        let pool = pool();
        let station_id = StationId::new("DE*ABC*S1").unwrap();
        pool.station(&station_id)
            .unwrap()
            .set_admin_status(AdminStatus::OutOfService);

        // EVSE-addressed: the owning station's admin status gates dispatch.
        let evse_target = ChargingTarget::Evse(EvseId::new("DE*ABC*E1").unwrap());
        let result = pool.reserve(reserve_request(evse_target.clone())).await;
        assert_eq!(result.status, DispatchStatus::OutOfService);

        // Station-addressed.
        let result = pool
            .reserve(reserve_request(ChargingTarget::Station(station_id)))
            .await;
        assert_eq!(result.status, DispatchStatus::OutOfService);

        let start = pool
            .remote_start(StartRequest {
                target: evse_target,
                provider_id: None,
                reservation_id: None,
            })
            .await;
        assert_eq!(start.status, DispatchStatus::OutOfService);

        // Pool-addressed dispatch has no eligible EVSE left.
        let result = pool
            .reserve(reserve_request(ChargingTarget::Pool(pool.id().clone())))
            .await;
        assert_eq!(result.status, DispatchStatus::UnknownEvse);
    }

    #[tokio::test]
    async fn sweep_clears_lapsed_holds() {
        let pool = pool();
        let reservation = pool
            .reserve(ReserveRequest {
                target: ChargingTarget::Pool(pool.id().clone()),
                provider_id: None,
                duration: Duration::minutes(5),
                linked_reservation: None,
            })
            .await
            .payload
            .unwrap();

        let swept = pool.sweep_expired(Utc::now() + Duration::minutes(10));
        assert_eq!(swept, vec![reservation.id.clone()]);
        assert!(!pool.has_reservation(&reservation.id));
    }
}
