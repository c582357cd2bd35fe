//! Dispatch result taxonomy
//!
//! Business outcomes are values, never errors: the status codes below drive
//! the remote→local fallback decision and are what callers branch on. Only
//! programming-contract violations surface as `CoreError`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of one reserve/start/stop/cancel dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    /// The operation committed
    Success,
    /// No EVSE with the given id is known to the handler
    UnknownEvse,
    /// No station with the given id is known to the handler
    UnknownStation,
    /// No pool with the given id is known to the handler
    UnknownPool,
    /// No reservation with the given id is known to the handler
    UnknownReservation,
    /// The session id does not match any active session
    InvalidSessionId,
    /// The target is held by another party's reservation
    AlreadyReserved,
    /// The target already has an active session
    AlreadyInUse,
    /// Local dispatch disabled by admin status
    OutOfService,
    /// The remote back-end accepted the request; the result is pending.
    /// Terminal for the dispatcher, never retried locally.
    AsyncOperation,
    /// Transport or handler failure, with a best-effort message
    Error(String),
}

impl DispatchStatus {
    /// The fixed "not handled by remote" set: a remote attempt ending in one
    /// of these statuses triggers local fallback. Everything else, including
    /// `AlreadyReserved` and `AsyncOperation`, is terminal, because the
    /// remote side may already have committed state for the target.
    pub fn triggers_local_fallback(&self) -> bool {
        matches!(
            self,
            Self::UnknownEvse
                | Self::UnknownStation
                | Self::UnknownPool
                | Self::UnknownReservation
                | Self::InvalidSessionId
                | Self::Error(_)
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::UnknownEvse => "UnknownEvse",
            Self::UnknownStation => "UnknownStation",
            Self::UnknownPool => "UnknownPool",
            Self::UnknownReservation => "UnknownReservation",
            Self::InvalidSessionId => "InvalidSessionId",
            Self::AlreadyReserved => "AlreadyReserved",
            Self::AlreadyInUse => "AlreadyInUse",
            Self::OutOfService => "OutOfService",
            Self::AsyncOperation => "AsyncOperation",
            Self::Error(_) => "Error",
        }
    }
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(msg) => write!(f, "Error({})", msg),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Which handler produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOrigin {
    /// The attached remote back-end
    Remote,
    /// The locally held entity tree
    Local,
}

/// Final result of one dispatch call.
///
/// `payload` carries the created reservation / session / charge detail
/// record on success; `runtime` is the wall-clock time of the whole dispatch
/// including the remote attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult<T> {
    pub status: DispatchStatus,
    pub origin: DispatchOrigin,
    pub runtime: Duration,
    pub payload: Option<T>,
}

impl<T> DispatchResult<T> {
    pub fn remote(status: DispatchStatus) -> Self {
        Self {
            status,
            origin: DispatchOrigin::Remote,
            runtime: Duration::ZERO,
            payload: None,
        }
    }

    pub fn local(status: DispatchStatus) -> Self {
        Self {
            status,
            origin: DispatchOrigin::Local,
            runtime: Duration::ZERO,
            payload: None,
        }
    }

    pub fn local_success(payload: T) -> Self {
        Self {
            status: DispatchStatus::Success,
            origin: DispatchOrigin::Local,
            runtime: Duration::ZERO,
            payload: Some(payload),
        }
    }

    pub fn with_runtime(mut self, runtime: Duration) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

// ── Tests ──────────────────────────────────────────────────────
