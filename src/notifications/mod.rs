//! Domain event fan-out
//!
//! Every operator owns an [`EventBus`]; the core publishes request/response,
//! structural and status-change events on it and never blocks on consumers.

mod event_bus;
pub mod events;

pub use event_bus::{EventBus, EventSubscriber, SharedEventBus};
pub use events::{EventMessage, RoamingEvent};
