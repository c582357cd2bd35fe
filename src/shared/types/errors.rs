use thiserror::Error;

/// Programming-contract violations.
///
/// Everything a caller can get wrong *before* a dispatch operation starts:
/// empty identifiers, a zero-length deadline. These raise immediately and
/// never participate in the remote/local fallback protocol; business
/// outcomes (unknown target, already reserved, …) are returned as
/// [`DispatchStatus`](crate::domain::DispatchStatus) values instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Precondition: {0}")]
    Precondition(String),

    #[error("Empty identifier for {kind}")]
    EmptyIdentifier { kind: &'static str },
}

impl CoreError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        CoreError::Precondition(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
