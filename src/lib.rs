//! # Roaming Core
//!
//! In-process core of a federated EV-charging roaming network: reservation
//! and charging-session dispatch across a hierarchy of charging station
//! operators, with remote-first routing and local fallback.
//!
//! ## Architecture
//!
//! - **domain**: Core business entities, types and traits
//! - **hierarchy**: Network → operator → pool → station → EVSE tree with
//!   guarded concurrent child indices and the operator Dispatcher
//! - **dispatch**: Remote back-end boundary, ownership indices and the
//!   shared remote-first/local-fallback runner
//! - **sync**: Status diffing against external observations
//! - **notifications**: Broadcast event bus and typed domain events
//! - **shared**: Cross-cutting error types

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod hierarchy;
pub mod notifications;
pub mod shared;
pub mod sync;

pub use config::{Config, MAX_HISTORY_SIZE};

// Re-export the dispatch surface for easy access
pub use dispatch::{
    RemoteOperatorBackend, ReservationIndex, ReserveRequest, SessionIndex, StartRequest,
};
pub use domain::{
    CancellationReason, ChargeDetailRecord, ChargingReservation, ChargingSession, ChargingTarget,
    DispatchOrigin, DispatchResult, DispatchStatus, EvseId, EvseStatus, NetworkId, OperatorId,
    PoolId, ProviderId, ReservationId, SessionId, StationId,
};
pub use hierarchy::{
    create_network, create_operator, sort_status_listing, ChargingPool, ChargingStation,
    ChargingStationOperator, EMobilityProvider, Evse, MutationOutcome, OperatorSummary,
    RoamingNetwork, SharedNetwork, SharedOperator,
};
pub use shared::{CoreError, CoreResult};

// Re-export notifications
pub use notifications::{EventBus, EventMessage, EventSubscriber, RoamingEvent, SharedEventBus};
pub use sync::{apply_diff, compute_diff, EvseStatusDiff};
