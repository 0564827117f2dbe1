//! Transport that keeps requests in memory

use super::{Transport, TransportRequest, TransportState, require_state};
use crate::entry::JournalEntry;
use crate::error::TransportResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every request it accepts
///
/// Clones share the record, so a caller can keep a handle after giving the
/// transport to a writer.
#[derive(Clone, Debug)]
pub struct MemoryTransport {
    name: String,
    state: TransportState,
    log: Arc<Mutex<Vec<TransportRequest>>>,
}

impl MemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: TransportState::Closed,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests accepted so far, in order
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.log.lock().clone()
    }

    /// Sequences of the entries accepted so far
    #[must_use]
    pub fn sequences(&self) -> Vec<u64> {
        self.log
            .lock()
            .iter()
            .filter_map(|r| match r {
                TransportRequest::WriteEntry(e) => Some(e.sequence()),
                _ => None,
            })
            .collect()
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> TransportState {
        self.state
    }

    fn open_file(
        &mut self,
        repository_hash: &str,
        filename: &str,
        timestamp: DateTime<Utc>,
    ) -> TransportResult<()> {
        require_state(&self.name, "open file", self.state, TransportState::Closed)?;
        self.log.lock().push(TransportRequest::OpenFile {
            repository_hash: repository_hash.to_string(),
            filename: filename.to_string(),
            timestamp,
        });
        self.state = TransportState::Open;
        Ok(())
    }

    fn write_entry(&mut self, entry: &JournalEntry) -> TransportResult<()> {
        require_state(&self.name, "write entry", self.state, TransportState::Open)?;
        self.log
            .lock()
            .push(TransportRequest::WriteEntry(entry.clone()));
        Ok(())
    }

    fn close_file(&mut self) -> TransportResult<()> {
        require_state(&self.name, "close file", self.state, TransportState::Open)?;
        self.log.lock().push(TransportRequest::CloseFile);
        self.state = TransportState::Closed;
        Ok(())
    }

    fn shutdown(&mut self) -> TransportResult<()> {
        match self.state {
            TransportState::Open => self.close_file()?,
            TransportState::Closed => {}
            TransportState::ShutDown => {
                return require_state(&self.name, "shutdown", self.state, TransportState::Closed);
            }
        }
        self.state = TransportState::ShutDown;
        Ok(())
    }

    fn last_sequence(&self) -> TransportResult<Option<u64>> {
        Ok(self.sequences().into_iter().max())
    }
}
