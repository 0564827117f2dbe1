//! Journal transports
//!
//! A transport is one destination for the journal stream. Every transport
//! follows the same state machine:
//!
//! ```text
//! Closed --open_file--> Open --close_file--> Closed
//!    \                    |
//!     +----shutdown-------+---> ShutDown
//! ```
//!
//! `write_entry` is only valid while `Open`. `shutdown` closes an open file
//! first. Nothing is valid after `ShutDown`.

pub(crate) mod frame;
mod local;
mod memory;
mod remote;
mod request;

pub use local::{IN_PROGRESS_PREFIX, LocalDirectoryTransport};
pub use memory::MemoryTransport;
pub use remote::RemoteTransport;
pub use request::TransportRequest;

use crate::entry::JournalEntry;
use crate::error::{TransportError, TransportResult};
use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle state of a transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Closed,
    Open,
    ShutDown,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::ShutDown => "shut down",
        })
    }
}

/// One destination for journal files
pub trait Transport: Send {
    fn name(&self) -> &str;

    fn state(&self) -> TransportState;

    /// Start a new journal file
    fn open_file(
        &mut self,
        repository_hash: &str,
        filename: &str,
        timestamp: DateTime<Utc>,
    ) -> TransportResult<()>;

    fn write_entry(&mut self, entry: &JournalEntry) -> TransportResult<()>;

    /// Finish the current journal file
    fn close_file(&mut self) -> TransportResult<()>;

    /// Close any open file and release resources
    fn shutdown(&mut self) -> TransportResult<()>;

    /// Highest sequence already written to this destination, for
    /// transports that can read back what they hold
    fn last_sequence(&self) -> TransportResult<Option<u64>> {
        Ok(None)
    }
}

/// Fail with `InvalidState` unless the transport is in `expected`
pub(crate) fn require_state(
    name: &str,
    operation: &'static str,
    state: TransportState,
    expected: TransportState,
) -> TransportResult<()> {
    if state == expected {
        Ok(())
    } else {
        Err(TransportError::InvalidState {
            name: name.to_string(),
            operation,
            state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::entry::ManagementMethod;

    /// State machine every transport must follow
    pub(crate) fn check_state_machine(transport: &mut dyn Transport) {
        let entry = JournalEntry::new(ManagementMethod::PurgeObject, Context::new(Utc::now()))
            .with_sequence(1)
            .with_argument("pid", "demo:1");

        assert_eq!(transport.state(), TransportState::Closed);
        assert!(matches!(
            transport.write_entry(&entry),
            Err(TransportError::InvalidState { .. })
        ));
        assert!(matches!(
            transport.close_file(),
            Err(TransportError::InvalidState { .. })
        ));

        transport
            .open_file("hash", "fedoraJournal20261018.100000.000.xml", Utc::now())
            .unwrap();
        assert_eq!(transport.state(), TransportState::Open);
        assert!(matches!(
            transport.open_file("hash", "other.xml", Utc::now()),
            Err(TransportError::InvalidState { .. })
        ));
        transport.write_entry(&entry).unwrap();
        transport.close_file().unwrap();
        assert_eq!(transport.state(), TransportState::Closed);

        transport
            .open_file("hash", "fedoraJournal20261018.100001.000.xml", Utc::now())
            .unwrap();
        transport.shutdown().unwrap();
        assert_eq!(transport.state(), TransportState::ShutDown);
        assert!(matches!(
            transport.open_file("hash", "late.xml", Utc::now()),
            Err(TransportError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_memory_state_machine() {
        check_state_machine(&mut MemoryTransport::new("memory"));
    }

    #[test]
    fn test_local_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let mut transport = LocalDirectoryTransport::new("local", dir.path()).unwrap();
        check_state_machine(&mut transport);
    }
}
