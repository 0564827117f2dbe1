//! Storage error types
//!
//! Each layer has its own error enum. `StoreError` wraps the lower-level
//! ones with the key and operation that failed, and converts into the
//! common error taxonomy at the API boundary.

use crate::path::StoredPath;
use fcrepo_common::{PidError, StoreKey};
use std::path::PathBuf;
use thiserror::Error;

/// Path algorithm error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid path pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid stored path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("path algorithm produced an empty path for {0}")]
    Empty(String),
}

/// File system error
#[derive(Error, Debug)]
pub enum FsError {
    #[error("file already exists: {0}")]
    AlreadyExists(StoredPath),

    #[error("file not found: {0}")]
    NotFound(StoredPath),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for file system operations
pub type FsResult<T> = Result<T, FsError>;

/// Path registry error
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no registry entry for {0}")]
    NotFound(StoreKey),

    #[error("corrupt registry entry {key:?}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("redb error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),

    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for RegistryError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Store error
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {key}")]
    NotFound { key: StoreKey },

    #[error("already exists: {key}")]
    AlreadyExists { key: StoreKey },

    /// Registry and file system disagree about `key`
    #[error("inconsistent storage for {key} at {path}: {detail}")]
    Inconsistent {
        key: StoreKey,
        path: StoredPath,
        detail: String,
    },

    #[error("{op} {key}: {source}")]
    Path {
        key: StoreKey,
        op: &'static str,
        #[source]
        source: PathError,
    },

    #[error("{op} {key}: {source}")]
    FileSystem {
        key: StoreKey,
        op: &'static str,
        #[source]
        source: FsError,
    },

    #[error("{op} {key}: {source}")]
    Registry {
        key: StoreKey,
        op: &'static str,
        #[source]
        source: RegistryError,
    },

    /// Failure of a whole-store operation (audit, rebuild, listing)
    #[error("{op} failed: {detail}")]
    Maintenance { op: &'static str, detail: String },

    #[error("invalid key: {0}")]
    InvalidKey(#[from] PidError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the registry and the file system disagree
    #[must_use]
    pub const fn is_inconsistency(&self) -> bool {
        matches!(self, Self::Inconsistent { .. })
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for fcrepo_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { key } => Self::NotFound(key.to_string()),
            StoreError::AlreadyExists { key } => Self::AlreadyExists(key.to_string()),
            StoreError::Inconsistent { key, path, detail } => Self::Inconsistent {
                key: key.to_string(),
                detail: format!("{path}: {detail}"),
            },
            StoreError::InvalidKey(e) => Self::InvalidPid(e),
            StoreError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Storage(other.to_string()),
        }
    }
}
