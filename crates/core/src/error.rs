//! Errors raised while building or checking domain values.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failures only: malformed input, bad identifiers and broken
/// record invariants. Storage failures live in the adapter errors of
/// `agritrain-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// A task record or status change broke the lifecycle rules.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
