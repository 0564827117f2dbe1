//! Runs management calls and journals the ones that commit

use crate::delegate::ManagementDelegate;
use crate::entry::JournalEntry;
use crate::error::JournalResult;
use crate::multicast::MulticastJournalWriter;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct JournalCreator {
    delegate: Arc<dyn ManagementDelegate>,
    writer: Arc<MulticastJournalWriter>,
    /// Calls run one at a time so the journal order is the execution order
    serial: Mutex<()>,
}

impl JournalCreator {
    pub fn new(delegate: Arc<dyn ManagementDelegate>, writer: Arc<MulticastJournalWriter>) -> Self {
        Self {
            delegate,
            writer,
            serial: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn writer(&self) -> &MulticastJournalWriter {
        &self.writer
    }

    /// Execute `entry` through the delegate, then journal it
    ///
    /// Nothing runs while the writer is read-only or shut down. A call the
    /// delegate rejects is not journaled. Returns the entry's sequence.
    pub fn execute(&self, entry: JournalEntry) -> JournalResult<u64> {
        let _serial = self.serial.lock();
        self.writer.check_writable()?;

        self.delegate.execute(entry.context(), &entry)?;
        let method = entry.method();
        match self.writer.write_entry(entry) {
            Ok(sequence) => {
                debug!("journaled {} as entry {}", method, sequence);
                Ok(sequence)
            }
            Err(e) => {
                warn!("{} committed but was not fully journaled: {}", method, e);
                Err(e)
            }
        }
    }

    pub fn shutdown(&self) -> JournalResult<()> {
        let _serial = self.serial.lock();
        self.writer.shutdown()
    }
}
