//! Reservation domain entity

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identifiers::{EvseId, PoolId, ProviderId, ReservationId, StationId};

/// Why a reservation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    /// Cancelled on request of the driver or provider
    UserRequest,
    /// Past its expiry timestamp
    Expired,
    /// Consumed by a RemoteStart referencing it
    ConsumedBySession,
    /// The targeted EVSE left service
    OutOfService,
    /// Aborted by the operator
    Aborted,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserRequest => "UserRequest",
            Self::Expired => "Expired",
            Self::ConsumedBySession => "ConsumedBySession",
            Self::OutOfService => "OutOfService",
            Self::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The hierarchy level a reserve/start request was addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargingTarget {
    Evse(EvseId),
    Station(StationId),
    Pool(PoolId),
}

/// A time-bounded hold on a charging target.
///
/// Created by a successful Reserve dispatch; destroyed by expiry, explicit
/// cancellation, or consumption by a RemoteStart carrying its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargingReservation {
    /// Unique reservation id
    pub id: ReservationId,
    /// What the caller addressed (EVSE, station or pool)
    pub target: ChargingTarget,
    /// The EVSE the hold was committed to
    pub evse_id: EvseId,
    /// Provider holding the reservation, if authenticated
    pub provider_id: Option<ProviderId>,
    /// Optional follow-up reservation chained to this one
    pub linked_reservation: Option<ReservationId>,
    /// Start of the hold
    pub start_time: DateTime<Utc>,
    /// End of the hold
    pub expiry: DateTime<Utc>,
    /// How the reservation ended, once it has
    pub cancellation: Option<CancellationReason>,
    pub created_at: DateTime<Utc>,
}

impl ChargingReservation {
    pub fn new(
        id: ReservationId,
        target: ChargingTarget,
        evse_id: EvseId,
        provider_id: Option<ProviderId>,
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            target,
            evse_id,
            provider_id,
            linked_reservation: None,
            start_time: now,
            expiry: now + duration,
            cancellation: None,
            created_at: now,
        }
    }

    /// Whether the hold is still in force at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.cancellation.is_none() && now < self.expiry
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.cancellation == Some(CancellationReason::Expired) || now >= self.expiry
    }

    /// End the hold with the given reason.
    pub fn cancel(&mut self, reason: CancellationReason) {
        self.cancellation = Some(reason);
    }

    /// Whether a RemoteStart from `provider` may consume this hold.
    pub fn consumable_by(&self, provider: Option<&ProviderId>) -> bool {
        match (&self.provider_id, provider) {
            (None, _) => true,
            (Some(owner), Some(caller)) => owner == caller,
            (Some(_), None) => false,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
