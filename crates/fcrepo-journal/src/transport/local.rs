//! Journal files in a local directory
//!
//! A file is written as `_<filename>` and renamed to `<filename>` when it is
//! closed, so readers of the directory only ever see complete files.

use super::{Transport, TransportState, require_state};
use crate::entry::JournalEntry;
use crate::error::{JournalError, JournalResult, TransportError, TransportResult};
use crate::recovery::journal_files;
use crate::xml::{JournalFileReader, JournalHeader, JournalXmlWriter};
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Prefix of a journal file that is still being written
pub const IN_PROGRESS_PREFIX: &str = "_";

struct OpenJournal {
    writer: JournalXmlWriter<BufWriter<File>>,
    partial: PathBuf,
    complete: PathBuf,
    entries: u64,
}

pub struct LocalDirectoryTransport {
    name: String,
    directory: PathBuf,
    state: TransportState,
    current: Option<OpenJournal>,
}

impl LocalDirectoryTransport {
    /// Transport writing into `directory`, created if missing
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> TransportResult<Self> {
        let name = name.into();
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|e| TransportError::io(&name, e))?;
        Ok(Self {
            name,
            directory,
            state: TransportState::Closed,
            current: None,
        })
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn encode_error(&self, e: JournalError) -> TransportError {
        match e {
            JournalError::Io(io) => TransportError::io(&self.name, io),
            other => TransportError::Encode {
                name: self.name.clone(),
                detail: other.to_string(),
            },
        }
    }
}

fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("directory sync of {:?} failed: {}", dir, e);
    }
}

/// Highest sequence readable from `path`; stops at the first bad entry
fn readable_sequence(path: &Path) -> JournalResult<Option<u64>> {
    let reader = JournalFileReader::open(path)?;
    Ok(reader.map_while(Result::ok).map(|e| e.sequence()).max())
}

impl Transport for LocalDirectoryTransport {
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
        if filename.is_empty() || filename.contains(['/', '\\']) || filename.starts_with('.') {
            return Err(TransportError::protocol(
                &self.name,
                format!("bad journal file name {filename:?}"),
            ));
        }

        let complete = self.directory.join(filename);
        let partial = self
            .directory
            .join(format!("{IN_PROGRESS_PREFIX}{filename}"));
        if complete.exists() {
            return Err(TransportError::io(
                &self.name,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} already exists", complete.display()),
                ),
            ));
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .map_err(|e| TransportError::io(&self.name, e))?;
        let mut writer = JournalXmlWriter::new(BufWriter::new(file));
        let header = JournalHeader {
            repository_hash: repository_hash.to_string(),
            timestamp,
        };
        writer
            .write_header(&header)
            .and_then(|()| writer.flush())
            .map_err(|e| self.encode_error(e))?;

        debug!("{}: opened {}", self.name, partial.display());
        self.current = Some(OpenJournal {
            writer,
            partial,
            complete,
            entries: 0,
        });
        self.state = TransportState::Open;
        Ok(())
    }

    fn write_entry(&mut self, entry: &JournalEntry) -> TransportResult<()> {
        require_state(&self.name, "write entry", self.state, TransportState::Open)?;
        let Some(current) = self.current.as_mut() else {
            return Err(TransportError::protocol(&self.name, "no open file"));
        };
        let result = current
            .writer
            .write_entry(entry)
            .and_then(|()| current.writer.flush());
        if let Err(e) = result {
            return Err(self.encode_error(e));
        }
        current.entries += 1;
        Ok(())
    }

    fn close_file(&mut self) -> TransportResult<()> {
        require_state(&self.name, "close file", self.state, TransportState::Open)?;
        let Some(mut current) = self.current.take() else {
            return Err(TransportError::protocol(&self.name, "no open file"));
        };
        // The file is finished even if the rename below fails
        self.state = TransportState::Closed;

        current
            .writer
            .write_footer()
            .and_then(|()| current.writer.flush())
            .map_err(|e| self.encode_error(e))?;
        current
            .writer
            .get_ref()
            .get_ref()
            .sync_all()
            .map_err(|e| TransportError::io(&self.name, e))?;
        fs::rename(&current.partial, &current.complete)
            .map_err(|e| TransportError::io(&self.name, e))?;
        sync_dir(&self.directory);

        info!(
            "{}: closed {} ({} entries)",
            self.name,
            current.complete.display(),
            current.entries
        );
        Ok(())
    }

    /// Last entry of the newest complete file, or of a file a crash left
    /// in progress if that went further
    fn last_sequence(&self) -> TransportResult<Option<u64>> {
        let files = journal_files(&self.directory).map_err(|e| self.encode_error(e))?;
        let mut highest = match files.last() {
            Some(newest) => readable_sequence(newest).map_err(|e| self.encode_error(e))?,
            None => None,
        };

        let entries = fs::read_dir(&self.directory).map_err(|e| TransportError::io(&self.name, e))?;
        for entry in entries {
            let path = entry.map_err(|e| TransportError::io(&self.name, e))?.path();
            let in_progress = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
                n.starts_with(IN_PROGRESS_PREFIX) && n.ends_with(".xml")
            });
            if !in_progress {
                continue;
            }
            match readable_sequence(&path) {
                Ok(sequence) => highest = highest.max(sequence),
                Err(e) => warn!("{}: unreadable partial file {}: {}", self.name, path.display(), e),
            }
        }
        Ok(highest)
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
}
