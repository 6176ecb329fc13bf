//! CSI error types.
//!
//! All errors crossing the service boundary are represented by the
//! [`CsiError`] enum, which derives [`thiserror::Error`] for ergonomic error
//! handling and also implements [`Serialize`]/[`Deserialize`] so errors can
//! travel across the QUIC transport layer.
//!
//! The variants follow the CSI status codes the orchestrator acts on:
//! `InvalidArgument` means the request must be fixed before retrying, while
//! `Internal` failures are safe to retry because every setup and teardown
//! operation is idempotent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mount::MountError;
use crate::store::StoreError;

/// Unified error type for CSI operations.
#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum CsiError {
    /// The caller supplied an invalid or incomplete request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The system is not in the state the operation requires.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// A collaborator (object store, mount binary, OS) failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// A QUIC / transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),
}

impl CsiError {
    /// Create a [`CsiError::TransportError`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::TransportError(e.to_string())
    }

    /// Create a [`CsiError::Internal`] from anything that implements
    /// [`std::fmt::Display`].
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// Create a [`CsiError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<MountError> for CsiError {
    fn from(e: MountError) -> Self {
        match e {
            MountError::SourceNotMounted(_) => Self::FailedPrecondition(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StoreError> for CsiError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CsiError::InvalidArgument("volume name missing".into());
        assert_eq!(err.to_string(), "invalid argument: volume name missing");
    }

    #[test]
    fn error_serde_roundtrip() {
        let err = CsiError::Internal("mount failed: exit status 1 output=boom".into());
        let json = serde_json::to_string(&err).expect("serialize");
        let de: CsiError = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(err, de);
    }

    #[test]
    fn unstaged_source_is_a_precondition_failure() {
        let err: CsiError = MountError::SourceNotMounted("/stage".into()).into();
        assert!(matches!(err, CsiError::FailedPrecondition(_)));
    }

    #[test]
    fn command_failure_keeps_output() {
        let err: CsiError = MountError::CommandFailed {
            target: "/stage".into(),
            status: "exit status: 1".into(),
            output: "bucket does not exist".into(),
        }
        .into();
        match err {
            CsiError::Internal(msg) => assert!(msg.contains("bucket does not exist")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
