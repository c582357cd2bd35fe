//! Core business entities, types and traits

pub mod identifiers;
pub mod reservation;
pub mod result;
pub mod schedule;
pub mod session;
pub mod status;

pub use identifiers::{
    EntityId, EvseId, IdKind, NetworkId, OperatorId, PoolId, ProviderId, ReservationId, SessionId,
    StationId,
};
pub use reservation::{CancellationReason, ChargingReservation, ChargingTarget};
pub use result::{DispatchOrigin, DispatchResult, DispatchStatus};
pub use schedule::{ChangeMethod, StatusEntry, StatusSchedule};
pub use session::{ChargeDetailRecord, ChargingSession, SessionStatus, StopReason};
pub use status::{AdminStatus, AggregateStatus, EvseStatus};
