//! Replay of archived journal files
//!
//! Files are read in name order (names embed their creation time) and
//! entries in file order. Sequences must strictly increase across the whole
//! run. Each entry is handed to the delegate with a rebuilt context that
//! carries where it came from in the recovery attributes.

use crate::context::JournalEntryContext;
use crate::delegate::ManagementDelegate;
use crate::error::{JournalError, JournalResult};
use crate::transport::IN_PROGRESS_PREFIX;
use crate::xml::JournalFileReader;
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Recovery attribute holding the replayed entry's sequence
pub const RECOVERY_SEQUENCE: &str = "journalSequence";

/// Recovery attribute holding the journal file name
pub const RECOVERY_FILE: &str = "journalFile";

/// Outcome of a replay
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub files: usize,
    pub entries: u64,
    /// Handed to the delegate
    pub applied: u64,
    /// At or below the starting point
    pub skipped: u64,
    pub no_ops: u64,
    pub last_sequence: Option<u64>,
}

/// Complete journal files in `dir`, in replay order
pub fn journal_files(dir: &Path) -> JournalResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.starts_with(IN_PROGRESS_PREFIX) {
            debug!("skipping incomplete journal file {}", name);
            continue;
        }
        if name.ends_with(".xml") {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Default)]
pub struct JournalRecovery {
    running: Mutex<()>,
}

impl JournalRecovery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay every entry after `after` from the journal files in `dir`
    ///
    /// Stops at the first entry that cannot be read or applied.
    pub fn replay(
        &self,
        dir: &Path,
        delegate: &dyn ManagementDelegate,
        after: Option<u64>,
    ) -> JournalResult<ReplayStats> {
        let _running = self
            .running
            .try_lock()
            .ok_or(JournalError::RecoveryInProgress)?;

        let files = journal_files(dir)?;
        info!(
            "replaying {} journal files from {} after {:?}",
            files.len(),
            dir.display(),
            after
        );

        let mut stats = ReplayStats::default();
        for path in &files {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let reader = JournalFileReader::open(path)?;
            debug!(
                "{}: repository {}, written {}",
                filename,
                reader.header().repository_hash,
                reader.header().timestamp
            );
            stats.files += 1;

            for entry in reader {
                let entry = entry?;
                let sequence = entry.sequence();
                if let Some(previous) = stats.last_sequence
                    && sequence <= previous
                {
                    return Err(JournalError::OutOfOrder {
                        previous,
                        found: sequence,
                        file: path.clone(),
                    });
                }
                stats.last_sequence = Some(sequence);
                stats.entries += 1;

                if after.is_some_and(|after| sequence <= after) {
                    stats.skipped += 1;
                    continue;
                }
                if entry.context().no_op() {
                    stats.no_ops += 1;
                    continue;
                }

                let mut context = JournalEntryContext::from_context(entry.context());
                context.set_recovery_value(RECOVERY_SEQUENCE, sequence.to_string());
                context.set_recovery_value(RECOVERY_FILE, filename.as_str());
                if let Err(e) = delegate.execute(&context.build(), &entry) {
                    error!(
                        "replay stopped at entry {} ({}) in {}: {}",
                        sequence,
                        entry.method(),
                        filename,
                        e
                    );
                    return Err(e);
                }
                stats.applied += 1;
            }
        }

        info!(
            "replay finished: {} applied, {} skipped, {} no-ops, last entry {:?}",
            stats.applied, stats.skipped, stats.no_ops, stats.last_sequence
        );
        Ok(stats)
    }
}
