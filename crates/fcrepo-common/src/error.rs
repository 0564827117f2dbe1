//! Error types for fcrepo
//!
//! This module defines the error taxonomy surfaced to callers of the
//! storage and journal layers. Component crates keep their own detailed
//! error enums and convert into this one at the API boundary.

use crate::types::PidError;
use thiserror::Error;

/// Common result type for fcrepo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for fcrepo
#[derive(Debug, Error)]
pub enum Error {
    // Not-found / conflict
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    // Storage consistency
    #[error("storage inconsistency for {key}: {detail}")]
    Inconsistent { key: String, detail: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Replication
    #[error("partial replication failure: {0}")]
    PartialReplication(String),

    #[error("replication failed: {0}")]
    Replication(String),

    // Malformed input
    #[error("invalid identifier: {0}")]
    InvalidPid(#[from] PidError),

    #[error("malformed input: {0}")]
    Malformed(String),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if the error means the registry and the file system disagree
    #[must_use]
    pub const fn is_inconsistency(&self) -> bool {
        matches!(self, Self::Inconsistent { .. })
    }

    /// Check if the caller can recover by changing the request
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::AlreadyExists(_) | Self::InvalidPid(_) | Self::Malformed(_)
        )
    }

    /// Get the HTTP status code the API layer reports for this error
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidPid(_) | Self::Malformed(_) => 400,

            // 404 Not Found
            Self::NotFound(_) => 404,

            // 409 Conflict
            Self::AlreadyExists(_) => 409,

            // 500 Internal Server Error
            Self::Inconsistent { .. }
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Internal(_) => 500,

            // 503 Service Unavailable
            Self::PartialReplication(_) | Self::Replication(_) | Self::Configuration(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_not_found() {
        assert!(Error::NotFound("demo:1".into()).is_not_found());
        assert!(!Error::AlreadyExists("demo:1".into()).is_not_found());
    }

    #[test]
    fn test_error_recoverable() {
        assert!(Error::AlreadyExists("demo:1".into()).is_recoverable());
        assert!(Error::InvalidPid(PidError::Empty).is_recoverable());
        assert!(
            !Error::Inconsistent {
                key: "demo:1".into(),
                detail: "file missing".into()
            }
            .is_recoverable()
        );
    }

    #[test]
    fn test_error_http_status() {
        assert_eq!(Error::NotFound("demo:1".into()).http_status_code(), 404);
        assert_eq!(Error::AlreadyExists("demo:1".into()).http_status_code(), 409);
        assert_eq!(Error::Malformed("bad xml".into()).http_status_code(), 400);
        assert_eq!(Error::PartialReplication("r2".into()).http_status_code(), 503);
        assert_eq!(Error::Internal("x".into()).http_status_code(), 500);
    }
}
