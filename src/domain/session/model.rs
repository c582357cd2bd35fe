//! Charging session domain entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identifiers::{EvseId, ProviderId, ReservationId, SessionId};

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Energy is flowing (or about to)
    Active,
    /// Stopped normally
    Completed,
    /// Stopped with an error
    Failed,
}

/// Why a session was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Remote stop request
    Remote,
    /// Driver unplugged
    Local,
    /// EVSE left service mid-session
    OutOfService,
    /// Transport or equipment error
    Error,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "Remote",
            Self::Local => "Local",
            Self::OutOfService => "OutOfService",
            Self::Error => "Error",
        }
    }
}

/// An active or completed charging event on one EVSE.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingSession {
    /// Unique session id
    pub id: SessionId,
    /// The EVSE delivering energy
    pub evse_id: EvseId,
    /// Provider the driver authenticated with
    pub provider_id: Option<ProviderId>,
    /// Reservation consumed by this session, if any
    pub reservation_id: Option<ReservationId>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub status: SessionStatus,
    /// Energy delivered so far, Wh
    pub energy_wh: f64,
}

impl ChargingSession {
    pub fn new(
        id: SessionId,
        evse_id: EvseId,
        provider_id: Option<ProviderId>,
        reservation_id: Option<ReservationId>,
    ) -> Self {
        Self {
            id,
            evse_id,
            provider_id,
            reservation_id,
            started_at: Utc::now(),
            stopped_at: None,
            stop_reason: None,
            status: SessionStatus::Active,
            energy_wh: 0.0,
        }
    }

    /// Stop the session, producing its charge detail record.
    pub fn stop(&mut self, reason: StopReason) -> ChargeDetailRecord {
        self.stopped_at = Some(Utc::now());
        self.stop_reason = Some(reason);
        self.status = match reason {
            StopReason::Error | StopReason::OutOfService => SessionStatus::Failed,
            _ => SessionStatus::Completed,
        };
        ChargeDetailRecord {
            session_id: self.id.clone(),
            evse_id: self.evse_id.clone(),
            provider_id: self.provider_id.clone(),
            started_at: self.started_at,
            stopped_at: self.stopped_at.expect("set above"),
            energy_wh: self.energy_wh,
            stop_reason: reason,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Billing-ready summary of a finished session.
///
/// Opaque to this core: produced on RemoteStop and handed to the caller;
/// pricing and settlement live elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeDetailRecord {
    pub session_id: SessionId,
    pub evse_id: EvseId,
    pub provider_id: Option<ProviderId>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub energy_wh: f64,
    pub stop_reason: StopReason,
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChargingSession {
        ChargingSession::new(
            SessionId::new("S-1").unwrap(),
            EvseId::new("DE*ABC*E1").unwrap(),
            None,
            None,
        )
    }

    #[test]
    fn new_session_is_active() {
        let s = sample();
        assert!(s.is_active());
        assert!(s.stopped_at.is_none());
    }

    #[test]
    fn stop_produces_cdr() {
        let mut s = sample();
        s.energy_wh = 7400.0;
        let cdr = s.stop(StopReason::Remote);
        assert!(!s.is_active());
        assert_eq!(s.status, SessionStatus::Completed);
        assert_eq!(cdr.session_id, s.id);
        assert_eq!(cdr.energy_wh, 7400.0);
        assert_eq!(cdr.stop_reason, StopReason::Remote);
    }

    #[test]
    fn error_stop_marks_failed() {
        let mut s = sample();
        s.stop(StopReason::Error);
        assert_eq!(s.status, SessionStatus::Failed);
    }
}
