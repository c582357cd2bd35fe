//! Dispatch plumbing
//!
//! The remote back-end boundary, the concurrent ownership indices consulted
//! by stop/cancel routing, and the shared remote-first/local-fallback runner
//! every dispatch level executes.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::domain::{DispatchOrigin, DispatchResult, DispatchStatus};

pub mod backend;
pub mod ownership;

pub use backend::{RemoteOperatorBackend, ReserveRequest, StartRequest};
pub use ownership::{OwnershipIndex, ReservationIndex, SessionIndex};

/// Run one dispatch leg: try the remote attempt (when present) under a
/// deadline and fall back to the local handler iff the remote leg is absent,
/// errored, timed out, or answered with one of the fixed "not handled"
/// statuses. Any other remote result is terminal: the remote side may
/// already have committed state, so retrying locally risks a double
/// reservation or start.
pub(crate) async fn remote_first<T, RFut, LFut>(
    operation: &'static str,
    remote: Option<RFut>,
    timeout: Duration,
    local: impl FnOnce() -> LFut,
) -> DispatchResult<T>
where
    RFut: Future<Output = DispatchResult<T>>,
    LFut: Future<Output = DispatchResult<T>>,
{
    if let Some(attempt) = remote {
        let mut result = match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result,
            Err(_) => {
                debug!(operation, "Remote attempt timed out");
                DispatchResult::remote(DispatchStatus::Error("remote attempt timed out".into()))
            }
        };
        result.origin = DispatchOrigin::Remote;
        if !result.status.triggers_local_fallback() {
            return result;
        }
        debug!(operation, status = %result.status, "Remote result not handled, trying local");
    }
    local().await
}
