use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid SPIFFE ID {value:?}: {reason}")]
    InvalidSpiffeId { value: String, reason: String },

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("identifier must not be empty")]
    EmptyIdentifier,
}

/// Classification shared by every SiteSync error type.
///
/// Callers decide what to do with a failure by its kind, not its message:
/// `NotFound` means stop and forget the item, `TransientApplyFailure` is
/// retried on the next poll, `Validation` is surfaced immediately, and
/// `ConcurrencyConflict` means another report won.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    ConcurrencyConflict,
    TransientApplyFailure,
    Internal,
}

impl ErrorKind {
    /// Whether the agent should leave the work in place and try again later.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransientApplyFailure | Self::Internal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::ConcurrencyConflict => "concurrency_conflict",
            Self::TransientApplyFailure => "transient_apply_failure",
            Self::Internal => "internal",
        }
    }
}

impl From<&TypeError> for ErrorKind {
    fn from(_: &TypeError) -> Self {
        ErrorKind::Validation
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
