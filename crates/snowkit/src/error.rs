//! Error types for SQL API calls.
//!
//! Every failure is classified into a [`declarative::ApiError`] so the
//! engine can decide whether to retry, treat a resource as absent, or fail
//! the node.

use declarative::ApiError;
use std::io;

/// Result type alias for SQL API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SQL compilation error raised for a missing object.
pub const SQL_OBJECT_NOT_FOUND: &str = "002003";

/// Errors that can occur while talking to the SQL API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Statement {
        /// HTTP status code.
        status: u16,
        /// Snowflake error code from the response body, if any.
        code: Option<String>,
        /// Error message.
        message: String,
    },

    /// The statement was accepted but did not finish within its timeout.
    #[error("statement {handle} still running")]
    StillRunning {
        /// Statement handle for polling.
        handle: String,
    },

    /// The request did not complete in time.
    #[error("request timed out")]
    TimedOut,

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be understood.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// HTTP status, if the API answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Statement { status, .. } => Some(*status),
            Self::StillRunning { .. } => Some(202),
            _ => None,
        }
    }

    fn is_not_found(code: Option<&str>, message: &str) -> bool {
        code == Some(SQL_OBJECT_NOT_FOUND) || message.to_ascii_lowercase().contains("does not exist")
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Statement { status, code, message } => match status {
                429 | 503 => Self::RateLimited,
                408 | 504 => Self::Timeout,
                401 | 403 => Self::Unauthorized(message),
                _ if Error::is_not_found(code.as_deref(), &message) => Self::NotFound,
                400..=499 => Self::Rejected(message),
                _ => Self::Transport(format!("HTTP {status}: {message}")),
            },
            Error::StillRunning { .. } | Error::TimedOut => Self::Timeout,
            Error::Transport(message) | Error::InvalidResponse(message) => Self::Transport(message),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(status) => Self::Statement {
                status,
                code: None,
                message: format!("HTTP {status}"),
            },
            ureq::Error::Timeout(_) => Self::TimedOut,
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            Self::TimedOut
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
