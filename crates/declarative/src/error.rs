//! Error types for reconciliation.
//!
//! Build-time errors (`DuplicateResource`, `InvalidDescriptor`,
//! `UnresolvedReference`, `Cycle`) abort before any remote call.
//! `Observation` aborts the pass before a plan is computed. Per-node
//! errors (`ImmutableFieldConflict`, `Api`, `GrantOrderingViolation`) are
//! recorded as the node's failure and only take its descendants down.

use crate::types::ResourceId;
use std::fmt;
use thiserror::Error;

/// Categories of control-plane errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Resource does not exist
    NotFound,
    /// Rate limit or timeout, worth one retry
    Transient,
    /// Credentials rejected or insufficient
    Auth,
    /// The control plane refused the request
    Rejected,
    /// Connection-level failure
    Transport,
}

impl ErrorCategory {
    /// Whether this error category is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Resource not found",
            Self::Transient => "Control plane busy or slow",
            Self::Auth => "Not authorized",
            Self::Rejected => "Request rejected",
            Self::Transport => "Connection problem",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check that the resource and its parents exist",
            Self::Transient => "Re-run the pass; converged resources will be left untouched",
            Self::Auth => "Check the administrative credential and its role",
            Self::Rejected => "Check the declared attributes against the platform's limits",
            Self::Transport => "Check network access to the control plane endpoint",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Error signal returned by a control plane call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,

    #[error("rate limited")]
    RateLimited,

    #[error("timed out")]
    Timeout,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound => ErrorCategory::NotFound,
            Self::RateLimited | Self::Timeout => ErrorCategory::Transient,
            Self::Unauthorized(_) => ErrorCategory::Auth,
            Self::Rejected(_) => ErrorCategory::Rejected,
            Self::Transport(_) => ErrorCategory::Transport,
        }
    }

    /// Whether this error is transient and worth retrying once.
    pub fn is_transient(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Errors raised by the reconciliation engine
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("resource declared twice: {0}")]
    DuplicateResource(ResourceId),

    #[error("invalid declaration {resource}: {message}")]
    InvalidDescriptor { resource: ResourceId, message: String },

    #[error("{from} references undeclared resource {target}")]
    UnresolvedReference { from: ResourceId, target: ResourceId },

    #[error("dependency cycle between {}", join_ids(.members))]
    Cycle { members: Vec<ResourceId> },

    #[error("failed to observe {resource}: {source}")]
    Observation {
        resource: ResourceId,
        #[source]
        source: ApiError,
    },

    #[error("immutable field `{field}` of {resource} differs: declared {desired}, found {observed}")]
    ImmutableFieldConflict {
        resource: ResourceId,
        field: String,
        desired: String,
        observed: String,
    },

    #[error("{resource}: {source}")]
    Api {
        resource: ResourceId,
        #[source]
        source: ApiError,
    },

    #[error("grant ordering violated at {resource}: {reason}")]
    GrantOrderingViolation { resource: ResourceId, reason: String },

    #[error("converge pass incomplete, not converged: {}", join_ids(.pending))]
    IncompleteConverge { pending: Vec<ResourceId> },

    #[error("pass cancelled")]
    Cancelled,

    #[error("worker pool: {0}")]
    WorkerPool(String),
}

impl Error {
    /// Whether the error was raised before any remote call
    pub fn is_build_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateResource(_)
                | Self::InvalidDescriptor { .. }
                | Self::UnresolvedReference { .. }
                | Self::Cycle { .. }
        )
    }
}

fn join_ids(ids: &[ResourceId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(ApiError::RateLimited.is_transient());
        assert!(ApiError::Timeout.is_transient());
        assert!(!ApiError::NotFound.is_transient());
        assert!(!ApiError::Rejected("bad size".into()).is_transient());
        assert!(!ApiError::Unauthorized("expired".into()).is_transient());
    }

    #[test]
    fn test_cycle_message_names_members() {
        let err = Error::Cycle {
            members: vec![ResourceId::role("A"), ResourceId::role("B")],
        };
        assert_eq!(err.to_string(), "dependency cycle between role.A, role.B");
        assert!(err.is_build_error());
    }

    #[test]
    fn test_observation_error_keeps_source() {
        use std::error::Error as _;
        let err = Error::Observation {
            resource: ResourceId::warehouse("W"),
            source: ApiError::Unauthorized("token expired".into()),
        };
        assert!(err.source().is_some());
        assert!(!err.is_build_error());
    }
}
