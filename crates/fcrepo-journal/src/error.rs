//! Journal error types

use crate::transport::TransportState;
use fcrepo_storage::StoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Error raised by a single transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport {name}: {operation} is not valid while {state}")]
    InvalidState {
        name: String,
        operation: &'static str,
        state: TransportState,
    },

    #[error("transport {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected or corrupt data on the wire
    #[error("transport {name}: protocol error: {detail}")]
    Protocol { name: String, detail: String },

    /// The far end received the request but refused it
    #[error("transport {name}: rejected by receiver: {detail}")]
    Rejected { name: String, detail: String },

    #[error("transport {name}: cannot encode entry: {detail}")]
    Encode { name: String, detail: String },
}

impl TransportError {
    pub(crate) fn io(name: &str, source: std::io::Error) -> Self {
        Self::Io {
            name: name.to_string(),
            source,
        }
    }

    pub(crate) fn protocol(name: &str, detail: impl Into<String>) -> Self {
        Self::Protocol {
            name: name.to_string(),
            detail: detail.into(),
        }
    }

    /// Name of the transport that raised the error
    #[must_use]
    pub fn transport(&self) -> &str {
        match self {
            Self::InvalidState { name, .. }
            | Self::Io { name, .. }
            | Self::Protocol { name, .. }
            | Self::Rejected { name, .. }
            | Self::Encode { name, .. } => name,
        }
    }
}

/// Journal error
#[derive(Error, Debug)]
pub enum JournalError {
    /// Journal XML that cannot be parsed or has missing pieces
    #[error("malformed journal: {0}")]
    Malformed(String),

    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),

    /// The first transport failed, so no transport received the request
    #[error("replication failed on every transport: {source}")]
    TotalReplicationFailure {
        #[source]
        source: TransportError,
    },

    /// Some transports applied the request before one failed
    #[error(
        "partial replication: applied to {applied:?}, failed on {failed}, \
         not attempted on {not_attempted:?}: {source}"
    )]
    PartialReplication {
        applied: Vec<String>,
        failed: String,
        not_attempted: Vec<String>,
        #[source]
        source: TransportError,
    },

    #[error("entry {found} in {file:?} does not follow entry {previous}")]
    OutOfOrder {
        previous: u64,
        found: u64,
        file: PathBuf,
    },

    #[error("{method} failed: {detail}")]
    Delegate { method: String, detail: String },

    #[error("entry {sequence} ({method}) has a bad argument {argument}: {detail}")]
    Argument {
        sequence: u64,
        method: String,
        argument: String,
        detail: String,
    },

    #[error("recovery is already running")]
    RecoveryInProgress,

    #[error("journal writer is shut down")]
    ShutDown,

    /// A replication failure left the transports out of step; no more
    /// entries are accepted until an operator repairs them
    #[error("journal writer is read-only after a replication failure")]
    ReadOnly,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("acknowledgment log {path:?}: {detail}")]
    AckLog { path: PathBuf, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl JournalError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Check if some but not all transports applied the failed request
    #[must_use]
    pub const fn is_partial_replication(&self) -> bool {
        matches!(self, Self::PartialReplication { .. })
    }

    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<quick_xml::Error> for JournalError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for JournalError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Result type for journal operations
pub type JournalResult<T> = Result<T, JournalError>;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

impl From<JournalError> for fcrepo_common::Error {
    fn from(e: JournalError) -> Self {
        match e {
            JournalError::Malformed(msg) => Self::Malformed(msg),
            JournalError::Io(e) => Self::Io(e),
            e @ JournalError::PartialReplication { .. } => Self::PartialReplication(e.to_string()),
            e @ JournalError::TotalReplicationFailure { .. } => Self::Replication(e.to_string()),
            JournalError::Store(e) => e.into(),
            JournalError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_replication_maps_to_common() {
        let err = JournalError::PartialReplication {
            applied: vec!["local".into()],
            failed: "remote".into(),
            not_attempted: vec!["backup".into()],
            source: TransportError::protocol("remote", "bad frame"),
        };
        assert!(err.is_partial_replication());
        let common: fcrepo_common::Error = err.into();
        assert!(matches!(common, fcrepo_common::Error::PartialReplication(_)));
    }
}
