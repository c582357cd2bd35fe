//! The charging hierarchy
//!
//! Network → operator → pool → station → EVSE, each level holding its
//! children in a guarded concurrent index. Structural mutations run the
//! two-phase vote/notify sequence; dispatch runs remote-first with local
//! fallback at the operator and pool levels.

pub mod evse;
pub mod index;
pub mod network;
pub mod operator;
pub mod pool;
pub mod station;
pub mod voting;

pub use evse::Evse;
pub use index::{EntityIndex, MutationOutcome};
pub use network::{create_network, EMobilityProvider, RoamingNetwork, SharedNetwork};
pub use operator::{
    create_operator, sort_status_listing, ChargingStationOperator, OperatorSummary,
    SharedOperator,
};
pub use pool::ChargingPool;
pub use station::ChargingStation;
pub use voting::{Vote, VotingNotificator};
