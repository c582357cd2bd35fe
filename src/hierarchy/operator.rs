//! Charging station operator: the operator-level Dispatcher
//!
//! The single entry point for Reserve / RemoteStart / RemoteStop /
//! CancelReservation against one operator's subtree. Every operation runs
//! the same sequence: publish the request event, try the attached remote
//! back-end (unless the target is pinned local), fall back to the local
//! pool tree when the remote leg is absent, fails, times out or answers
//! "not handled", maintain the ownership indices, then publish the response
//! event with the elapsed runtime and record metrics. Business failures are
//! returned as status values; only precondition violations raise, and they
//! do so before the request event fires.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::dispatch::{
    remote_first, RemoteOperatorBackend, ReservationIndex, ReserveRequest, SessionIndex,
    StartRequest,
};
use crate::domain::identifiers::PoolKind;
use crate::domain::{
    AdminStatus, AggregateStatus, CancellationReason, ChargeDetailRecord, ChargingReservation,
    ChargingSession, ChargingTarget, DispatchResult, DispatchStatus, EvseId, EvseStatus,
    NetworkId, OperatorId, PoolId, ReservationId, SessionId, StationId, StatusSchedule,
};
use crate::notifications::events::{
    CancelRequestedEvent, DispatchCompletedEvent, EntityPath, ReserveRequestedEvent,
    StartRequestedEvent, StatusChangedEvent, StopRequestedEvent, StructureChangedEvent,
};
use crate::notifications::{EventBus, RoamingEvent};
use crate::shared::{CoreError, CoreResult};

use super::evse::Evse;
use super::index::{EntityIndex, MutationOutcome};
use super::pool::ChargingPool;
use super::station::ChargingStation;

/// Hierarchy counts and live dispatch state, for monitoring consumers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OperatorSummary {
    pub operator_id: OperatorId,
    pub pool_count: usize,
    pub station_count: usize,
    pub evse_count: usize,
    pub active_reservations: usize,
    pub active_sessions: usize,
}

/// A charging station operator: owner of pools, the optional remote
/// back-end, the local-only pin set and both ownership indices.
pub struct ChargingStationOperator {
    id: OperatorId,
    network_id: NetworkId,
    pools: EntityIndex<OperatorId, PoolKind, Arc<ChargingPool>>,
    remote: RwLock<Option<Arc<dyn RemoteOperatorBackend>>>,
    /// Identifiers that must never be delegated to the remote back-end
    local_only: DashSet<String>,
    reservations: ReservationIndex,
    sessions: SessionIndex,
    events: EventBus,
    config: Config,
    admin_status: Mutex<StatusSchedule<AdminStatus>>,
    status: Mutex<StatusSchedule<AggregateStatus>>,
}

impl ChargingStationOperator {
    pub fn new(id: OperatorId, network_id: NetworkId) -> Self {
        Self::with_config(id, network_id, Config::default())
    }

    pub fn with_config(id: OperatorId, network_id: NetworkId, config: Config) -> Self {
        let pools = EntityIndex::new(id.clone());
        let history = config.max_history_size;
        Self {
            id,
            network_id,
            pools,
            remote: RwLock::new(None),
            local_only: DashSet::new(),
            reservations: ReservationIndex::new(),
            sessions: SessionIndex::new(),
            events: EventBus::with_capacity(config.event_capacity),
            config,
            admin_status: Mutex::new(StatusSchedule::with_capacity(
                AdminStatus::Operational,
                history,
            )),
            status: Mutex::new(StatusSchedule::with_capacity(
                AggregateStatus::Unknown,
                history,
            )),
        }
    }

    pub fn id(&self) -> &OperatorId {
        &self.id
    }

    pub fn network_id(&self) -> &NetworkId {
        &self.network_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The reservation ownership fast path.
    pub fn reservation_index(&self) -> &ReservationIndex {
        &self.reservations
    }

    /// The session ownership fast path.
    pub fn session_index(&self) -> &SessionIndex {
        &self.sessions
    }

    // ─── Remote back-end ───────────────────────────────────────────────

    pub fn attach_remote_backend(&self, backend: Arc<dyn RemoteOperatorBackend>) {
        *self.remote.write().expect("remote lock poisoned") = Some(backend);
    }

    pub fn detach_remote_backend(&self) {
        *self.remote.write().expect("remote lock poisoned") = None;
    }

    fn remote_backend(&self) -> Option<Arc<dyn RemoteOperatorBackend>> {
        self.remote.read().expect("remote lock poisoned").clone()
    }

    /// Pin an identifier to local handling: dispatches addressing it skip
    /// the remote back-end entirely.
    pub fn pin_local(&self, id: impl AsRef<str>) {
        self.local_only.insert(id.as_ref().to_string());
    }

    fn is_pinned(&self, id: &str) -> bool {
        self.local_only.contains(id)
    }

    fn target_pinned(&self, target: &ChargingTarget) -> bool {
        match target {
            ChargingTarget::Evse(id) => self.is_pinned(id.as_str()),
            ChargingTarget::Station(id) => self.is_pinned(id.as_str()),
            ChargingTarget::Pool(id) => self.is_pinned(id.as_str()),
        }
    }

    // ─── Structure ─────────────────────────────────────────────────────

    pub fn pools(&self) -> &EntityIndex<OperatorId, PoolKind, Arc<ChargingPool>> {
        &self.pools
    }

    pub fn pool(&self, id: &PoolId) -> Option<Arc<ChargingPool>> {
        self.pools.get(id)
    }

    /// Create and add a pool through the vote/notify guard, publishing an
    /// `EntityAdded` event on commit.
    pub fn create_pool(&self, pool_id: PoolId) -> MutationOutcome<Arc<ChargingPool>> {
        let pool = Arc::new(ChargingPool::with_timeout(
            pool_id.clone(),
            self.id.clone(),
            self.config.remote_timeout,
        ));
        let outcome = self.pools.add(Utc::now(), pool_id.clone(), pool);
        if outcome.is_committed() {
            self.events.publish(RoamingEvent::EntityAdded(StructureChangedEvent {
                path: self.path(Some(pool_id), None, None),
                timestamp: Utc::now(),
            }));
        }
        outcome
    }

    /// Remove a pool through the vote/notify guard, publishing an
    /// `EntityRemoved` event on commit.
    pub fn remove_pool(&self, pool_id: &PoolId) -> MutationOutcome<Arc<ChargingPool>> {
        let outcome = self.pools.remove(Utc::now(), pool_id);
        if outcome.is_committed() {
            self.events.publish(RoamingEvent::EntityRemoved(StructureChangedEvent {
                path: self.path(Some(pool_id.clone()), None, None),
                timestamp: Utc::now(),
            }));
        }
        outcome
    }

    /// Create a station inside `pool_id`, publishing on commit.
    pub fn create_station(
        &self,
        pool_id: &PoolId,
        station_id: StationId,
    ) -> MutationOutcome<Arc<ChargingStation>> {
        let Some(pool) = self.pool(pool_id) else {
            return MutationOutcome::Missing;
        };
        let outcome = pool.create_station(station_id.clone());
        if outcome.is_committed() {
            self.events.publish(RoamingEvent::EntityAdded(StructureChangedEvent {
                path: self.path(Some(pool_id.clone()), Some(station_id), None),
                timestamp: Utc::now(),
            }));
        }
        outcome
    }

    /// Create an EVSE inside `station_id`, publishing on commit.
    pub fn create_evse(
        &self,
        pool_id: &PoolId,
        station_id: &StationId,
        evse_id: EvseId,
    ) -> MutationOutcome<Arc<Evse>> {
        let Some(station) = self.pool(pool_id).and_then(|p| p.station(station_id)) else {
            return MutationOutcome::Missing;
        };
        let outcome = station.create_evse(evse_id.clone());
        if outcome.is_committed() {
            self.events.publish(RoamingEvent::EntityAdded(StructureChangedEvent {
                path: self.path(Some(pool_id.clone()), Some(station_id.clone()), Some(evse_id)),
                timestamp: Utc::now(),
            }));
        }
        outcome
    }

    /// Locate an EVSE anywhere in the subtree, with its pool and station.
    pub fn find_evse(
        &self,
        id: &EvseId,
    ) -> Option<(Arc<ChargingPool>, Arc<ChargingStation>, Arc<Evse>)> {
        for pool in self.pools.values_sorted() {
            for station in pool.stations().values_sorted() {
                if let Some(evse) = station.evse(id) {
                    return Some((pool, station, evse));
                }
            }
        }
        None
    }

    pub fn summary(&self) -> OperatorSummary {
        let mut station_count = 0;
        let mut evse_count = 0;
        let mut active_reservations = 0;
        let mut active_sessions = 0;
        for pool in self.pools.values_sorted() {
            active_reservations += pool.active_reservation_count();
            active_sessions += pool.active_session_count();
            for station in pool.stations().values_sorted() {
                station_count += 1;
                evse_count += station.evses().len();
            }
        }
        OperatorSummary {
            operator_id: self.id.clone(),
            pool_count: self.pools.len(),
            station_count,
            evse_count,
            active_reservations,
            active_sessions,
        }
    }

    // ─── Reserve ───────────────────────────────────────────────────────

    /// Reserve a target. `deadline` caps the remote attempt for this call;
    /// `None` uses the configured remote timeout.
    pub async fn reserve(
        &self,
        request: ReserveRequest,
        deadline: Option<Duration>,
    ) -> CoreResult<DispatchResult<ChargingReservation>> {
        if request.duration <= chrono::Duration::zero() {
            return Err(CoreError::precondition("reservation duration must be positive"));
        }
        let started = Instant::now();
        let tracking_id = Uuid::new_v4().to_string();
        self.events.publish_tracked(
            &tracking_id,
            RoamingEvent::ReserveRequested(ReserveRequestedEvent {
                target: request.target.clone(),
                provider_id: request.provider_id.clone(),
                timestamp: Utc::now(),
            }),
        );

        let remote = self
            .remote_backend()
            .filter(|_| !self.target_pinned(&request.target))
            .map(|backend| {
                let request = request.clone();
                async move { backend.reserve(request).await }
            });
        let timeout = deadline.unwrap_or(self.config.remote_timeout);
        let result = remote_first("reserve", remote, timeout, || async {
            self.reserve_local(request).await
        })
        .await
        .with_runtime(started.elapsed());

        self.finish(
            "reserve",
            &tracking_id,
            &result,
            result.payload.as_ref().map(|r| r.id.clone()),
            None,
            RoamingEvent::ReserveCompleted,
        );
        Ok(result)
    }

    async fn reserve_local(
        &self,
        request: ReserveRequest,
    ) -> DispatchResult<ChargingReservation> {
        if !self.admin_status().is_operational() {
            return DispatchResult::local(DispatchStatus::OutOfService);
        }
        let Some(pool) = self.pool_owning_target(&request.target) else {
            return DispatchResult::local(unknown_for_target(&request.target));
        };
        let result = pool.reserve(request).await;
        if result.is_success() {
            if let Some(reservation) = &result.payload {
                // CAS registration; a duplicate id is left untouched.
                self.reservations
                    .register(reservation.id.clone(), pool.id().clone());
            }
        }
        result
    }

    // ─── Cancel reservation ────────────────────────────────────────────

    pub async fn cancel_reservation(
        &self,
        reservation_id: &ReservationId,
        reason: CancellationReason,
        deadline: Option<Duration>,
    ) -> CoreResult<DispatchResult<()>> {
        let started = Instant::now();
        let tracking_id = Uuid::new_v4().to_string();
        self.events.publish_tracked(
            &tracking_id,
            RoamingEvent::CancelRequested(CancelRequestedEvent {
                reservation_id: reservation_id.clone(),
                reason,
                timestamp: Utc::now(),
            }),
        );

        let remote = self
            .remote_backend()
            .filter(|_| !self.is_pinned(reservation_id.as_str()))
            .map(|backend| {
                let id = reservation_id.clone();
                async move { backend.cancel_reservation(&id, reason).await }
            });
        let timeout = deadline.unwrap_or(self.config.remote_timeout);
        let result = remote_first("cancel_reservation", remote, timeout, || async {
            self.cancel_reservation_local(reservation_id, reason).await
        })
        .await
        .with_runtime(started.elapsed());

        self.finish(
            "cancel_reservation",
            &tracking_id,
            &result,
            Some(reservation_id.clone()),
            None,
            RoamingEvent::CancelCompleted,
        );
        Ok(result)
    }

    async fn cancel_reservation_local(
        &self,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> DispatchResult<()> {
        // Fast path through the ownership index; a stale miss falls back
        // to scanning every pool's own store.
        let pool = self
            .reservations
            .resolve(reservation_id)
            .and_then(|pool_id| self.pool(&pool_id))
            .or_else(|| {
                self.pools
                    .values_sorted()
                    .into_iter()
                    .find(|pool| pool.has_reservation(reservation_id))
            });
        let Some(pool) = pool else {
            return DispatchResult::local(DispatchStatus::UnknownReservation);
        };
        let result = pool.cancel_reservation(reservation_id, reason).await;
        if result.is_success() {
            self.reservations.unregister(reservation_id);
        }
        result
    }

    // ─── Remote start ──────────────────────────────────────────────────

    pub async fn remote_start(
        &self,
        request: StartRequest,
        deadline: Option<Duration>,
    ) -> CoreResult<DispatchResult<ChargingSession>> {
        let started = Instant::now();
        let tracking_id = Uuid::new_v4().to_string();
        self.events.publish_tracked(
            &tracking_id,
            RoamingEvent::StartRequested(StartRequestedEvent {
                target: request.target.clone(),
                provider_id: request.provider_id.clone(),
                reservation_id: request.reservation_id.clone(),
                timestamp: Utc::now(),
            }),
        );

        let remote = self
            .remote_backend()
            .filter(|_| !self.target_pinned(&request.target))
            .map(|backend| {
                let request = request.clone();
                async move { backend.remote_start(request).await }
            });
        let timeout = deadline.unwrap_or(self.config.remote_timeout);
        let result = remote_first("remote_start", remote, timeout, || async {
            self.remote_start_local(request).await
        })
        .await
        .with_runtime(started.elapsed());

        self.finish(
            "remote_start",
            &tracking_id,
            &result,
            None,
            result.payload.as_ref().map(|s| s.id.clone()),
            RoamingEvent::StartCompleted,
        );
        Ok(result)
    }

    async fn remote_start_local(&self, request: StartRequest) -> DispatchResult<ChargingSession> {
        if !self.admin_status().is_operational() {
            return DispatchResult::local(DispatchStatus::OutOfService);
        }
        // A referenced reservation routes through its owning pool first.
        let pool = request
            .reservation_id
            .as_ref()
            .and_then(|id| {
                self.reservations
                    .resolve(id)
                    .and_then(|pool_id| self.pool(&pool_id))
                    .or_else(|| {
                        self.pools
                            .values_sorted()
                            .into_iter()
                            .find(|pool| pool.has_reservation(id))
                    })
            })
            .or_else(|| self.pool_owning_target(&request.target));
        let Some(pool) = pool else {
            return DispatchResult::local(unknown_for_target(&request.target));
        };
        let result = pool.remote_start(request).await;
        if result.is_success() {
            if let Some(session) = &result.payload {
                self.sessions.register(session.id.clone(), pool.id().clone());
                if let Some(consumed) = &session.reservation_id {
                    self.reservations.unregister(consumed);
                }
            }
        }
        result
    }

    // ─── Remote stop ───────────────────────────────────────────────────

    pub async fn remote_stop(
        &self,
        session_id: &SessionId,
        deadline: Option<Duration>,
    ) -> CoreResult<DispatchResult<ChargeDetailRecord>> {
        let started = Instant::now();
        let tracking_id = Uuid::new_v4().to_string();
        self.events.publish_tracked(
            &tracking_id,
            RoamingEvent::StopRequested(StopRequestedEvent {
                session_id: session_id.clone(),
                timestamp: Utc::now(),
            }),
        );

        let remote = self
            .remote_backend()
            .filter(|_| !self.is_pinned(session_id.as_str()))
            .map(|backend| {
                let id = session_id.clone();
                async move { backend.remote_stop(&id).await }
            });
        let timeout = deadline.unwrap_or(self.config.remote_timeout);
        let result = remote_first("remote_stop", remote, timeout, || async {
            self.remote_stop_local(session_id).await
        })
        .await
        .with_runtime(started.elapsed());

        self.finish(
            "remote_stop",
            &tracking_id,
            &result,
            None,
            Some(session_id.clone()),
            RoamingEvent::StopCompleted,
        );
        Ok(result)
    }

    async fn remote_stop_local(&self, session_id: &SessionId) -> DispatchResult<ChargeDetailRecord> {
        let pool = self
            .sessions
            .resolve(session_id)
            .and_then(|pool_id| self.pool(&pool_id))
            .or_else(|| {
                self.pools
                    .values_sorted()
                    .into_iter()
                    .find(|pool| pool.has_session(session_id))
            });
        let Some(pool) = pool else {
            return DispatchResult::local(DispatchStatus::InvalidSessionId);
        };
        let result = pool.remote_stop(session_id).await;
        if result.is_success() {
            self.sessions.unregister(session_id);
        }
        result
    }

    // ─── Reservation expiry ────────────────────────────────────────────

    /// Drop every reservation past its expiry, cleaning the ownership
    /// index. Returns the number of reservations swept.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let mut swept = 0;
        for pool in self.pools.values_sorted() {
            for reservation_id in pool.sweep_expired(now) {
                self.reservations.unregister(&reservation_id);
                swept += 1;
            }
        }
        if swept > 0 {
            info!(operator = %self.id, swept, "Expired reservations dropped");
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

    /// Record an observed EVSE status, bubble the aggregates and publish a
    /// single `StatusChanged` message carrying the full entity path.
    pub fn update_evse_status(
        &self,
        evse_id: &EvseId,
        status: EvseStatus,
        timestamp: DateTime<Utc>,
    ) -> Result<bool, DispatchStatus> {
        let Some((pool, station, evse)) = self.find_evse(evse_id) else {
            return Err(DispatchStatus::UnknownEvse);
        };
        let old_status = evse.current_status();
        let changed = evse.set_status(status, timestamp);
        if changed {
            station.recompute_status();
            pool.recompute_status();
            self.status
                .lock()
                .expect("status lock poisoned")
                .insert(rollup(&self.pools.values_sorted()));
            self.events.publish(RoamingEvent::StatusChanged(StatusChangedEvent {
                path: self.path(
                    Some(pool.id().clone()),
                    Some(station.id().clone()),
                    Some(evse_id.clone()),
                ),
                old_status,
                new_status: status,
                timestamp,
            }));
        }
        Ok(changed)
    }

    /// Current operational status of every EVSE in the subtree, sorted by
    /// id. The "current snapshot" side of the status diff engine.
    pub fn status_snapshot(&self) -> std::collections::BTreeMap<EvseId, EvseStatus> {
        let mut snapshot = std::collections::BTreeMap::new();
        for pool in self.pools.values_sorted() {
            for station in pool.stations().values_sorted() {
                for evse in station.evses().values_sorted() {
                    snapshot.insert(evse.id().clone(), evse.current_status());
                }
            }
        }
        snapshot
    }

    /// EVSEs listed by (id, status), deterministically ordered by id then
    /// status scalar.
    pub fn evse_status_listing(&self) -> Vec<(EvseId, EvseStatus)> {
        let mut listing: Vec<(EvseId, EvseStatus)> = self.status_snapshot().into_iter().collect();
        sort_status_listing(&mut listing);
        listing
    }

    // ─── Internals ─────────────────────────────────────────────────────

    fn pool_owning_target(&self, target: &ChargingTarget) -> Option<Arc<ChargingPool>> {
        self.pools
            .values_sorted()
            .into_iter()
            .find(|pool| pool.owns_target(target))
    }

    fn path(
        &self,
        pool_id: Option<PoolId>,
        station_id: Option<StationId>,
        evse_id: Option<EvseId>,
    ) -> EntityPath {
        EntityPath {
            operator_id: self.id.clone(),
            pool_id,
            station_id,
            evse_id,
        }
    }

    /// Step 8 of every dispatch: response event plus runtime accounting.
    fn finish<T>(
        &self,
        operation: &'static str,
        tracking_id: &str,
        result: &DispatchResult<T>,
        reservation_id: Option<ReservationId>,
        session_id: Option<SessionId>,
        wrap: fn(DispatchCompletedEvent) -> RoamingEvent,
    ) {
        if !result.is_success() {
            warn!(operation, status = %result.status, "Dispatch did not succeed");
        }
        metrics::histogram!("roaming_dispatch_latency_seconds", "operation" => operation)
            .record(result.runtime.as_secs_f64());
        metrics::counter!(
            "roaming_dispatch_total",
            "operation" => operation,
            "status" => result.status.as_str()
        )
        .increment(1);
        self.events.publish_tracked(
            tracking_id,
            wrap(DispatchCompletedEvent {
                status: result.status.clone(),
                origin: result.origin,
                runtime_ms: result.runtime.as_millis() as u64,
                reservation_id,
                session_id,
                timestamp: Utc::now(),
            }),
        );
    }
}

/// Order a status listing by EVSE id, then by status scalar. One
/// operator's listing never repeats an id, but listings merged across
/// operators can, and there the scalar decides.
pub fn sort_status_listing(listing: &mut [(EvseId, EvseStatus)]) {
    listing.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.scalar().cmp(&b.1.scalar())));
}

fn unknown_for_target(target: &ChargingTarget) -> DispatchStatus {
    match target {
        ChargingTarget::Evse(_) => DispatchStatus::UnknownEvse,
        ChargingTarget::Station(_) => DispatchStatus::UnknownStation,
        ChargingTarget::Pool(_) => DispatchStatus::UnknownPool,
    }
}

fn rollup(pools: &[Arc<ChargingPool>]) -> AggregateStatus {
    let statuses: Vec<AggregateStatus> = pools.iter().map(|p| p.current_status()).collect();
    if statuses.is_empty() {
        return AggregateStatus::Unknown;
    }
    let available = statuses
        .iter()
        .filter(|s| matches!(s, AggregateStatus::Available))
        .count();
    if available == statuses.len() {
        AggregateStatus::Available
    } else if statuses
        .iter()
        .any(|s| matches!(s, AggregateStatus::Available | AggregateStatus::PartiallyAvailable))
    {
        AggregateStatus::PartiallyAvailable
    } else if statuses.iter().all(|s| matches!(s, AggregateStatus::Unknown)) {
        AggregateStatus::Unknown
    } else {
        AggregateStatus::Unavailable
    }
}

/// Shared operator handle
pub type SharedOperator = Arc<ChargingStationOperator>;

pub fn create_operator(id: OperatorId, network_id: NetworkId) -> SharedOperator {
    Arc::new(ChargingStationOperator::new(id, network_id))
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;

    use super::*;

    /// Answers every operation with a fixed status, counting calls.
    struct ScriptedBackend {
        status: DispatchStatus,
        delay: Option<StdDuration>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn answering(status: DispatchStatus) -> Arc<Self> {
            Arc::new(Self { status, delay: None, calls: AtomicUsize::new(0) })
        }

        fn stalled(delay: StdDuration) -> Arc<Self> {
            Arc::new(Self {
                status: DispatchStatus::Success,
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn answer<T>(&self) -> DispatchResult<T> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            DispatchResult::remote(self.status.clone())
        }
    }

    #[async_trait]
    impl RemoteOperatorBackend for ScriptedBackend {
        async fn reserve(&self, _request: ReserveRequest) -> DispatchResult<ChargingReservation> {
            self.answer().await
        }

        async fn cancel_reservation(
            &self,
            _reservation_id: &ReservationId,
            _reason: CancellationReason,
        ) -> DispatchResult<()> {
            self.answer().await
        }

        async fn remote_start(&self, _request: StartRequest) -> DispatchResult<ChargingSession> {
            self.answer().await
        }

        async fn remote_stop(&self, _session_id: &SessionId) -> DispatchResult<ChargeDetailRecord> {
            self.answer().await
        }
    }

    fn operator_with_tree() -> ChargingStationOperator {
        let operator = ChargingStationOperator::new(
            OperatorId::new("OP1").unwrap(),
            NetworkId::new("NET").unwrap(),
        );
        operator.create_pool(PoolId::new("P1").unwrap());
        operator.create_station(&PoolId::new("P1").unwrap(), StationId::new("ST1").unwrap());
        operator.create_evse(
            &PoolId::new("P1").unwrap(),
            &StationId::new("ST1").unwrap(),
            EvseId::new("E1").unwrap(),
        );
        operator
    }

    use crate::domain::ProviderId;

    fn reserve_request(evse: &str) -> ReserveRequest {
        ReserveRequest {
            target: ChargingTarget::Evse(EvseId::new(evse).unwrap()),
            provider_id: Some(ProviderId::new("EMP1").unwrap()),
            duration: chrono::Duration::minutes(30),
            linked_reservation: None,
        }
    }

    #[tokio::test]
    async fn local_reserve_then_cancel_roundtrip() {
        let operator = operator_with_tree();
        let result = operator.reserve(reserve_request("E1"), None).await.unwrap();
        assert_eq!(result.status, DispatchStatus::Success);
        assert_eq!(result.origin, crate::domain::DispatchOrigin::Local);
        let reservation = result.payload.unwrap();
        assert_eq!(operator.reservation_index().len(), 1);

        let cancel = operator
            .cancel_reservation(&reservation.id, CancellationReason::UserRequest, None)
            .await
            .unwrap();
        assert_eq!(cancel.status, DispatchStatus::Success);
        assert_eq!(operator.reservation_index().len(), 0);
    }

    #[tokio::test]
    async fn non_positive_duration_is_a_precondition_error() {
        let operator = operator_with_tree();
        let mut subscriber = operator.events().subscribe();
        let mut request = reserve_request("E1");
        request.duration = chrono::Duration::zero();
        assert!(operator.reserve(request, None).await.is_err());
        // The guard runs before the request event is published.
        assert!(subscriber.try_recv().is_none());
    }

    #[tokio::test]
    async fn remote_success_is_terminal_and_skips_local() {
        let operator = operator_with_tree();
        let backend = ScriptedBackend::answering(DispatchStatus::Success);
        operator.attach_remote_backend(backend.clone());

        let result = operator.reserve(reserve_request("E1"), None).await.unwrap();
        assert_eq!(result.status, DispatchStatus::Success);
        assert_eq!(result.origin, crate::domain::DispatchOrigin::Remote);
        assert_eq!(backend.call_count(), 1);
        // Nothing was committed locally.
        assert_eq!(operator.reservation_index().len(), 0);
        assert_eq!(operator.summary().active_reservations, 0);
    }

    #[tokio::test]
    async fn remote_already_reserved_is_terminal() {
        let operator = operator_with_tree();
        let backend = ScriptedBackend::answering(DispatchStatus::AlreadyReserved);
        operator.attach_remote_backend(backend.clone());

        let result = operator.reserve(reserve_request("E1"), None).await.unwrap();
        assert_eq!(result.status, DispatchStatus::AlreadyReserved);
        assert_eq!(result.origin, crate::domain::DispatchOrigin::Remote);
        assert_eq!(operator.reservation_index().len(), 0);
    }

    #[tokio::test]
    async fn remote_unknown_evse_falls_back_to_local() {
        let operator = operator_with_tree();
        let backend = ScriptedBackend::answering(DispatchStatus::UnknownEvse);
        operator.attach_remote_backend(backend.clone());

        let result = operator.reserve(reserve_request("E1"), None).await.unwrap();
        assert_eq!(backend.call_count(), 1);
        assert_eq!(result.status, DispatchStatus::Success);
        assert_eq!(result.origin, crate::domain::DispatchOrigin::Local);
        assert_eq!(operator.reservation_index().len(), 1);
    }

    #[tokio::test]
    async fn remote_timeout_falls_back_and_local_start_registers_session() {
        let operator = ChargingStationOperator::with_config(
            OperatorId::new("OP1").unwrap(),
            NetworkId::new("NET").unwrap(),
            Config::default().with_remote_timeout(StdDuration::from_millis(20)),
        );
        operator.create_pool(PoolId::new("P1").unwrap());
        operator.create_station(&PoolId::new("P1").unwrap(), StationId::new("ST1").unwrap());
        operator.create_evse(
            &PoolId::new("P1").unwrap(),
            &StationId::new("ST1").unwrap(),
            EvseId::new("E1").unwrap(),
        );
        let backend = ScriptedBackend::stalled(StdDuration::from_secs(5));
        operator.attach_remote_backend(backend.clone());

        let result = operator
            .remote_start(
                StartRequest {
                    target: ChargingTarget::Evse(EvseId::new("E1").unwrap()),
                    provider_id: None,
                    reservation_id: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(backend.call_count(), 1);
        assert_eq!(result.status, DispatchStatus::Success);
        assert_eq!(result.origin, crate::domain::DispatchOrigin::Local);
        assert_eq!(operator.session_index().len(), 1);

        let session = result.payload.unwrap();
        let stop = operator.remote_stop(&session.id, None).await.unwrap();
        assert_eq!(stop.status, DispatchStatus::Success);
        assert_eq!(operator.session_index().len(), 0);
    }

    #[test]
    fn merged_listings_order_equal_ids_by_status_scalar() {
        let e1 = EvseId::new("E1").unwrap();
        let e2 = EvseId::new("E2").unwrap();
        // Two operators reporting the same EVSE id with different statuses.
        let mut merged = vec![
            (e2.clone(), EvseStatus::Available),
            (e1.clone(), EvseStatus::Charging),
            (e1.clone(), EvseStatus::Available),
            (e1.clone(), EvseStatus::Offline),
        ];
        sort_status_listing(&mut merged);
        assert_eq!(
            merged,
            vec![
                (e1.clone(), EvseStatus::Available),
                (e1.clone(), EvseStatus::Charging),
                (e1, EvseStatus::Offline),
                (e2, EvseStatus::Available),
            ]
        );
    }

    #[test]
    fn created_pools_inherit_the_configured_remote_timeout() {
        let operator = ChargingStationOperator::with_config(
            OperatorId::new("OP1").unwrap(),
            NetworkId::new("NET").unwrap(),
            Config::default().with_remote_timeout(StdDuration::from_millis(20)),
        );
        let pool_id = PoolId::new("P1").unwrap();
        operator.create_pool(pool_id.clone());
        let pool = operator.pool(&pool_id).unwrap();
        assert_eq!(pool.remote_timeout(), StdDuration::from_millis(20));
    }

    #[tokio::test]
    async fn per_call_deadline_overrides_the_configured_timeout() {
        // The configured timeout stays at the 30s default; only the
        // caller's deadline can explain a fallback this fast.
        let operator = operator_with_tree();
        let backend = ScriptedBackend::stalled(StdDuration::from_secs(5));
        operator.attach_remote_backend(backend.clone());

        let result = operator
            .reserve(
                reserve_request("E1"),
                Some(StdDuration::from_millis(20)),
            )
            .await
            .unwrap();
        assert_eq!(backend.call_count(), 1);
        assert_eq!(result.status, DispatchStatus::Success);
        assert_eq!(result.origin, crate::domain::DispatchOrigin::Local);
        assert_eq!(operator.reservation_index().len(), 1);
    }

    #[tokio::test]
    async fn pinned_target_never_reaches_the_backend() {
        let operator = operator_with_tree();
        let backend = ScriptedBackend::answering(DispatchStatus::Success);
        operator.attach_remote_backend(backend.clone());
        operator.pin_local("E1");

        let result = operator.reserve(reserve_request("E1"), None).await.unwrap();
        assert_eq!(backend.call_count(), 0);
        assert_eq!(result.origin, crate::domain::DispatchOrigin::Local);
        assert_eq!(result.status, DispatchStatus::Success);
    }

    #[tokio::test]
    async fn unknown_target_reports_by_target_kind() {
        let operator = operator_with_tree();
        let result = operator.reserve(reserve_request("NOPE"), None).await.unwrap();
        assert_eq!(result.status, DispatchStatus::UnknownEvse);

        let result = operator
            .reserve(
                ReserveRequest {
                    target: ChargingTarget::Station(StationId::new("NOPE").unwrap()),
                    provider_id: None,
                    duration: chrono::Duration::minutes(10),
                    linked_reservation: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.status, DispatchStatus::UnknownStation);
    }

    #[tokio::test]
    async fn dispatch_publishes_request_and_response_with_one_tracking_id() {
        let operator = operator_with_tree();
        let mut subscriber = operator.events().subscribe();

        let result = operator.reserve(reserve_request("E1"), None).await.unwrap();
        assert!(result.is_success());

        let request = subscriber.recv().await.unwrap();
        let response = subscriber.recv().await.unwrap();
        assert_eq!(request.event.event_type(), "reserve_requested");
        assert_eq!(response.event.event_type(), "reserve_completed");
        assert_eq!(request.tracking_id, response.tracking_id);
        match response.event {
            RoamingEvent::ReserveCompleted(completed) => {
                assert_eq!(completed.status, DispatchStatus::Success);
                assert!(completed.reservation_id.is_some());
            }
            other => panic!("unexpected event {:?}", other.event_type()),
        }
    }

    #[tokio::test]
    async fn sweep_drops_expired_reservations_from_the_index() {
        let operator = operator_with_tree();
        let mut request = reserve_request("E1");
        request.duration = chrono::Duration::minutes(1);
        let result = operator.reserve(request, None).await.unwrap();
        assert!(result.is_success());
        assert_eq!(operator.reservation_index().len(), 1);

        let later = Utc::now() + chrono::Duration::minutes(5);
        assert_eq!(operator.sweep_expired(later), 1);
        assert_eq!(operator.reservation_index().len(), 0);
        assert_eq!(operator.summary().active_reservations, 0);
    }

    #[tokio::test]
    async fn status_update_bubbles_and_publishes_the_full_path() {
        let operator = operator_with_tree();
        let mut subscriber = operator.events().subscribe();
        let evse_id = EvseId::new("E1").unwrap();

        let changed = operator
            .update_evse_status(&evse_id, EvseStatus::Charging, Utc::now())
            .unwrap();
        assert!(changed);
        assert_eq!(operator.current_status(), AggregateStatus::Unavailable);

        let message = subscriber.recv().await.unwrap();
        match message.event {
            RoamingEvent::StatusChanged(event) => {
                assert_eq!(event.new_status, EvseStatus::Charging);
                assert_eq!(event.path.evse_id, Some(evse_id.clone()));
                assert_eq!(event.path.station_id, Some(StationId::new("ST1").unwrap()));
                assert_eq!(event.path.pool_id, Some(PoolId::new("P1").unwrap()));
            }
            other => panic!("unexpected event {:?}", other.event_type()),
        }

        // Re-reporting the same status is a no-op and publishes nothing.
        let changed = operator
            .update_evse_status(&evse_id, EvseStatus::Charging, Utc::now())
            .unwrap();
        assert!(!changed);
        assert!(subscriber.try_recv().is_none());
    }

    #[tokio::test]
    async fn summary_counts_the_tree() {
        let operator = operator_with_tree();
        operator.create_evse(
            &PoolId::new("P1").unwrap(),
            &StationId::new("ST1").unwrap(),
            EvseId::new("E2").unwrap(),
        );
        let summary = operator.summary();
        assert_eq!(summary.pool_count, 1);
        assert_eq!(summary.station_count, 1);
        assert_eq!(summary.evse_count, 2);
    }
}
