use super::Transport;
use crate::entry::JournalEntry;
use crate::error::TransportResult;
use chrono::{DateTime, Utc};

/// One step of the journal stream, applied identically to every transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportRequest {
    OpenFile {
        repository_hash: String,
        filename: String,
        timestamp: DateTime<Utc>,
    },
    WriteEntry(JournalEntry),
    CloseFile,
}

impl TransportRequest {
    pub fn apply(&self, transport: &mut dyn Transport) -> TransportResult<()> {
        match self {
            Self::OpenFile {
                repository_hash,
                filename,
                timestamp,
            } => transport.open_file(repository_hash, filename, *timestamp),
            Self::WriteEntry(entry) => transport.write_entry(entry),
            Self::CloseFile => transport.close_file(),
        }
    }

    /// Short name for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OpenFile { .. } => "open file",
            Self::WriteEntry(_) => "write entry",
            Self::CloseFile => "close file",
        }
    }
}
