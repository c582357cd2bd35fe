//! Charging reservations

mod model;

pub use model::{CancellationReason, ChargingReservation, ChargingTarget};
