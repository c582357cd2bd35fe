//! Charging sessions

mod model;

pub use model::{ChargeDetailRecord, ChargingSession, SessionStatus, StopReason};
