//! Cross-cutting types shared by every layer.

pub mod types;

pub use types::{CoreError, CoreResult};
