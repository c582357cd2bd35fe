//! EVSE: the leaf of the charging hierarchy
//!
//! An EVSE owns its status schedules, at most one active reservation and at
//! most one active session. The instance is the lock boundary: each piece of
//! state sits behind its own mutex and is never mutated from outside.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::domain::{
    AdminStatus, CancellationReason, ChargeDetailRecord, ChargingReservation, ChargingSession,
    DispatchStatus, EvseId, EvseStatus, ProviderId, ReservationId, SessionId, StationId,
    StatusEntry, StatusSchedule, StopReason,
};

/// A single charge point connector.
pub struct Evse {
    id: EvseId,
    station_id: StationId,
    admin_status: Mutex<StatusSchedule<AdminStatus>>,
    status: Mutex<StatusSchedule<EvseStatus>>,
    reservation: Mutex<Option<ChargingReservation>>,
    session: Mutex<Option<ChargingSession>>,
}

impl Evse {
    pub fn new(id: EvseId, station_id: StationId) -> Self {
        Self {
            id,
            station_id,
            admin_status: Mutex::new(StatusSchedule::new(AdminStatus::Operational)),
            status: Mutex::new(StatusSchedule::new(EvseStatus::Unknown)),
            reservation: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &EvseId {
        &self.id
    }

    pub fn station_id(&self) -> &StationId {
        &self.station_id
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

    pub fn current_status(&self) -> EvseStatus {
        self.status
            .lock()
            .expect("status lock poisoned")
            .current_status()
    }

    /// Record an observed status. Returns whether the head changed.
    pub fn set_status(&self, status: EvseStatus, timestamp: DateTime<Utc>) -> bool {
        self.status
            .lock()
            .expect("status lock poisoned")
            .insert_at(status, timestamp)
    }

    /// The `n` most recent status entries, newest first (all when `None`).
    pub fn status_history(&self, n: Option<usize>) -> Vec<StatusEntry<EvseStatus>> {
        self.status.lock().expect("status lock poisoned").take(n)
    }

    pub fn is_available(&self) -> bool {
        self.admin_status().is_operational()
            && self.active_reservation().is_none()
            && self.active_session().is_none()
    }

    // ─── Reservation ───────────────────────────────────────────────────

    /// The reservation currently in force, expired holds filtered out.
    pub fn active_reservation(&self) -> Option<ChargingReservation> {
        let guard = self.reservation.lock().expect("reservation lock poisoned");
        guard
            .as_ref()
            .filter(|r| r.is_active(Utc::now()))
            .cloned()
    }

    /// Place a hold on this EVSE.
    pub fn reserve(&self, reservation: ChargingReservation) -> DispatchStatus {
        if !self.admin_status().is_operational() {
            return DispatchStatus::OutOfService;
        }
        let mut guard = self.reservation.lock().expect("reservation lock poisoned");
        if guard.as_ref().is_some_and(|r| r.is_active(Utc::now())) {
            return DispatchStatus::AlreadyReserved;
        }
        if self
            .session
            .lock()
            .expect("session lock poisoned")
            .as_ref()
            .is_some_and(|s| s.is_active())
        {
            return DispatchStatus::AlreadyInUse;
        }
        *guard = Some(reservation);
        drop(guard);
        self.set_status(EvseStatus::Reserved, Utc::now());
        DispatchStatus::Success
    }

    /// Release the hold with the given id.
    pub fn cancel_reservation(
        &self,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> Result<ChargingReservation, DispatchStatus> {
        let mut guard = self.reservation.lock().expect("reservation lock poisoned");
        match guard.as_ref() {
            Some(held) if &held.id == reservation_id => {
                let mut cancelled = guard.take().expect("checked above");
                cancelled.cancel(reason);
                drop(guard);
                self.set_status(EvseStatus::Available, Utc::now());
                Ok(cancelled)
            }
            _ => Err(DispatchStatus::UnknownReservation),
        }
    }

    /// Drop the hold if it has lapsed, returning it for index cleanup.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Option<ChargingReservation> {
        let mut guard = self.reservation.lock().expect("reservation lock poisoned");
        if guard.as_ref().is_some_and(|r| r.is_expired(now)) {
            let mut expired = guard.take().expect("checked above");
            expired.cancel(CancellationReason::Expired);
            drop(guard);
            if self.current_status() == EvseStatus::Reserved {
                self.set_status(EvseStatus::Available, now);
            }
            return Some(expired);
        }
        None
    }

    // ─── Session ───────────────────────────────────────────────────────

    pub fn active_session(&self) -> Option<ChargingSession> {
        let guard = self.session.lock().expect("session lock poisoned");
        guard.as_ref().filter(|s| s.is_active()).cloned()
    }

    /// Begin a charging session, consuming a matching reservation if one is
    /// held. A hold by another party blocks the start.
    pub fn start_session(
        &self,
        session_id: SessionId,
        provider_id: Option<ProviderId>,
        reservation_id: Option<ReservationId>,
    ) -> Result<ChargingSession, DispatchStatus> {
        if !self.admin_status().is_operational() {
            return Err(DispatchStatus::OutOfService);
        }
        // Lock order everywhere on this type: reservation before session.
        let mut held = self.reservation.lock().expect("reservation lock poisoned");
        let mut session_guard = self.session.lock().expect("session lock poisoned");
        if session_guard.as_ref().is_some_and(|s| s.is_active()) {
            return Err(DispatchStatus::AlreadyInUse);
        }

        let mut consumed = None;
        if let Some(reservation) = held.as_ref().filter(|r| r.is_active(Utc::now())) {
            let matches_id = reservation_id
                .as_ref()
                .is_some_and(|id| id == &reservation.id);
            if matches_id || reservation.consumable_by(provider_id.as_ref()) {
                let mut reservation = held.take().expect("checked above");
                reservation.cancel(CancellationReason::ConsumedBySession);
                consumed = Some(reservation.id.clone());
            } else {
                return Err(DispatchStatus::AlreadyReserved);
            }
        } else if reservation_id.is_some() {
            // The caller referenced a hold this EVSE does not have.
            return Err(DispatchStatus::UnknownReservation);
        }

        let session = ChargingSession::new(session_id, self.id.clone(), provider_id, consumed);
        *session_guard = Some(session.clone());
        drop(session_guard);
        drop(held);
        self.set_status(EvseStatus::Charging, Utc::now());
        Ok(session)
    }

    /// End the active session, producing a charge detail record.
    pub fn stop_session(
        &self,
        session_id: &SessionId,
        reason: StopReason,
    ) -> Result<ChargeDetailRecord, DispatchStatus> {
        let mut guard = self.session.lock().expect("session lock poisoned");
        match guard.as_ref() {
            Some(active) if &active.id == session_id && active.is_active() => {
                let mut session = guard.take().expect("checked above");
                let cdr = session.stop(reason);
                drop(guard);
                self.set_status(EvseStatus::Available, Utc::now());
                Ok(cdr)
            }
            _ => Err(DispatchStatus::InvalidSessionId),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
