//! Remote operator back-end boundary
//!
//! An operator may be a stand-in for a system reachable over some transport
//! this core does not prescribe. The back-end exposes the same four
//! operations as the local dispatcher and the same result taxonomy; it is
//! an opaque, possibly-absent collaborator. Transport failures surface as
//! [`DispatchStatus::Error`](crate::domain::DispatchStatus::Error); timeouts
//! are imposed by the caller, not by implementations.

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::{
    CancellationReason, ChargeDetailRecord, ChargingReservation, ChargingSession, ChargingTarget,
    DispatchResult, ProviderId, ReservationId, SessionId,
};

/// Arguments of one Reserve dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    /// EVSE, station or pool to hold
    pub target: ChargingTarget,
    /// Provider requesting the hold
    pub provider_id: Option<ProviderId>,
    /// Requested hold duration
    #[serde(with = "crate::dispatch::backend::serde_duration")]
    pub duration: Duration,
    /// Reservation to chain this one to
    pub linked_reservation: Option<ReservationId>,
}

/// Arguments of one RemoteStart dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    /// EVSE, station or pool to start at
    pub target: ChargingTarget,
    /// Provider the driver authenticated with
    pub provider_id: Option<ProviderId>,
    /// Reservation to consume, when the driver reserved ahead
    pub reservation_id: Option<ReservationId>,
}

/// The four roaming operations, as implemented by a remote operator.
#[async_trait]
pub trait RemoteOperatorBackend: Send + Sync {
    async fn reserve(&self, request: ReserveRequest) -> DispatchResult<ChargingReservation>;

    async fn cancel_reservation(
        &self,
        reservation_id: &ReservationId,
        reason: CancellationReason,
    ) -> DispatchResult<()>;

    async fn remote_start(&self, request: StartRequest) -> DispatchResult<ChargingSession>;

    async fn remote_stop(&self, session_id: &SessionId) -> DispatchResult<ChargeDetailRecord>;
}

pub(crate) mod serde_duration {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.num_seconds().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::seconds(i64::deserialize(deserializer)?))
    }
}
