//! Domain events
//!
//! Request/response pairs for the four dispatch operations, structural
//! add/remove notices, and status changes. Consumed by external logging,
//! metrics or forwarding collaborators over the broadcast bus; the core's
//! correctness never depends on anyone listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CancellationReason, ChargingTarget, DispatchOrigin, DispatchStatus, EvseId, EvseStatus,
    OperatorId, PoolId, ProviderId, ReservationId, SessionId, StationId,
};

/// Event types published on an operator's bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoamingEvent {
    /// Reserve dispatch entered
    ReserveRequested(ReserveRequestedEvent),
    /// Reserve dispatch finished
    ReserveCompleted(DispatchCompletedEvent),
    /// RemoteStart dispatch entered
    StartRequested(StartRequestedEvent),
    /// RemoteStart dispatch finished
    StartCompleted(DispatchCompletedEvent),
    /// RemoteStop dispatch entered
    StopRequested(StopRequestedEvent),
    /// RemoteStop dispatch finished
    StopCompleted(DispatchCompletedEvent),
    /// CancelReservation dispatch entered
    CancelRequested(CancelRequestedEvent),
    /// CancelReservation dispatch finished
    CancelCompleted(DispatchCompletedEvent),
    /// A subordinate entity was added (after a successful vote)
    EntityAdded(StructureChangedEvent),
    /// A subordinate entity was removed (after a successful vote)
    EntityRemoved(StructureChangedEvent),
    /// An EVSE's operational status changed
    StatusChanged(StatusChangedEvent),
}

impl RoamingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ReserveRequested(_) => "reserve_requested",
            Self::ReserveCompleted(_) => "reserve_completed",
            Self::StartRequested(_) => "start_requested",
            Self::StartCompleted(_) => "start_completed",
            Self::StopRequested(_) => "stop_requested",
            Self::StopCompleted(_) => "stop_completed",
            Self::CancelRequested(_) => "cancel_requested",
            Self::CancelCompleted(_) => "cancel_completed",
            Self::EntityAdded(_) => "entity_added",
            Self::EntityRemoved(_) => "entity_removed",
            Self::StatusChanged(_) => "status_changed",
        }
    }
}

/// Position of an entity in the hierarchy, used for status bubbling: one
/// typed message carries the full path instead of per-level delegate
/// re-wiring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPath {
    pub operator_id: OperatorId,
    pub pool_id: Option<PoolId>,
    pub station_id: Option<StationId>,
    pub evse_id: Option<EvseId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequestedEvent {
    pub target: ChargingTarget,
    pub provider_id: Option<ProviderId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequestedEvent {
    pub target: ChargingTarget,
    pub provider_id: Option<ProviderId>,
    pub reservation_id: Option<ReservationId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequestedEvent {
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequestedEvent {
    pub reservation_id: ReservationId,
    pub reason: CancellationReason,
    pub timestamp: DateTime<Utc>,
}

/// Shared response shape for all four operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchCompletedEvent {
    pub status: DispatchStatus,
    pub origin: DispatchOrigin,
    /// Wall-clock dispatch time, including the remote attempt
    pub runtime_ms: u64,
    pub reservation_id: Option<ReservationId>,
    pub session_id: Option<SessionId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureChangedEvent {
    pub path: EntityPath,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedEvent {
    pub path: EntityPath,
    pub old_status: EvseStatus,
    pub new_status: EvseStatus,
    pub timestamp: DateTime<Utc>,
}

/// Wrapper adding the event-tracking id and emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event-tracking id; request/response events of one dispatch share it.
    pub tracking_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RoamingEvent,
}

impl EventMessage {
    pub fn new(event: RoamingEvent) -> Self {
        Self::with_tracking_id(uuid::Uuid::new_v4().to_string(), event)
    }

    pub fn with_tracking_id(tracking_id: String, event: RoamingEvent) -> Self {
        Self {
            tracking_id,
            timestamp: Utc::now(),
            event,
        }
    }
}
