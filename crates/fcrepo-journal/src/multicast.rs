//! Journal writer that replicates every request to an ordered list of
//! transports
//!
//! Requests go to the transports one at a time, in configuration order, and
//! stop at the first failure. A failure on the first transport means nothing
//! was replicated (`TotalReplicationFailure`); a later failure leaves the
//! transports out of step (`PartialReplication`). Either way the writer turns
//! read-only: no further entries are accepted until it is rebuilt.

use crate::ack::AcknowledgmentLog;
use crate::entry::JournalEntry;
use crate::error::{JournalError, JournalResult};
use crate::transport::{LocalDirectoryTransport, RemoteTransport, Transport, TransportRequest};
use chrono::{DateTime, TimeDelta, Utc};
use fcrepo_common::config::{JournalConfig, TransportConfig};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How journal files are named and when they rotate
#[derive(Clone, Debug)]
pub struct JournalFileOptions {
    pub repository_hash: String,
    pub filename_prefix: String,
    /// 0 disables the entry limit
    pub max_entries_per_file: u64,
    /// `None` disables the age limit
    pub max_file_age: Option<Duration>,
}

impl JournalFileOptions {
    #[must_use]
    pub fn from_config(config: &JournalConfig) -> Self {
        Self {
            repository_hash: config.repository_hash.clone(),
            filename_prefix: config.filename_prefix.clone(),
            max_entries_per_file: config.max_entries_per_file,
            max_file_age: (config.max_file_age_secs > 0)
                .then(|| Duration::from_secs(config.max_file_age_secs)),
        }
    }

    /// `<prefix><yyyyMMdd.HHmmss.SSS>.xml`
    #[must_use]
    pub fn filename(&self, timestamp: DateTime<Utc>) -> String {
        format!(
            "{}{}.xml",
            self.filename_prefix,
            timestamp.format("%Y%m%d.%H%M%S.%3f")
        )
    }
}

impl Default for JournalFileOptions {
    fn default() -> Self {
        Self::from_config(&JournalConfig::default())
    }
}

struct CurrentFile {
    filename: String,
    opened_at: DateTime<Utc>,
    entries: u64,
}

struct WriterState {
    transports: Vec<Box<dyn Transport>>,
    acks: AcknowledgmentLog,
    next_sequence: u64,
    current: Option<CurrentFile>,
    /// Timestamp of the newest file name handed out
    last_file_time: Option<DateTime<Utc>>,
    read_only: bool,
    shut_down: bool,
}

pub struct MulticastJournalWriter {
    options: JournalFileOptions,
    state: Mutex<WriterState>,
}

impl MulticastJournalWriter {
    /// Writer over `transports`, continuing after the highest sequence in
    /// `acks` or already held by any transport
    pub fn new(
        options: JournalFileOptions,
        transports: Vec<Box<dyn Transport>>,
        mut acks: AcknowledgmentLog,
    ) -> JournalResult<Self> {
        if transports.is_empty() {
            return Err(JournalError::Configuration(
                "journal writer needs at least one transport".into(),
            ));
        }
        let mut names = HashSet::new();
        for transport in &transports {
            if !names.insert(transport.name().to_string()) {
                return Err(JournalError::Configuration(format!(
                    "duplicate transport name {:?}",
                    transport.name()
                )));
            }
            acks.register(transport.name());
        }

        let mut highest = acks.highest();
        for transport in &transports {
            let held = transport.last_sequence()?;
            if held > highest {
                debug!("transport {} already holds entry {:?}", transport.name(), held);
                highest = held;
            }
        }
        let next_sequence = highest.map_or(1, |s| s + 1);
        info!(
            "journal writer over {} transports, next sequence {}",
            transports.len(),
            next_sequence
        );
        Ok(Self {
            options,
            state: Mutex::new(WriterState {
                transports,
                acks,
                next_sequence,
                current: None,
                last_file_time: None,
                read_only: false,
                shut_down: false,
            }),
        })
    }

    /// Build the transports and acknowledgment log named by `config`
    pub fn from_config(config: &JournalConfig) -> JournalResult<Self> {
        let mut transports: Vec<Box<dyn Transport>> = Vec::with_capacity(config.transports.len());
        for transport in &config.transports {
            let transport: Box<dyn Transport> = match transport {
                TransportConfig::Local { name, directory } => {
                    Box::new(LocalDirectoryTransport::new(name.clone(), directory.clone())?)
                }
                TransportConfig::Remote {
                    name,
                    address,
                    timeout_secs,
                } => Box::new(RemoteTransport::new(
                    name.clone(),
                    *address,
                    Duration::from_secs(*timeout_secs),
                )),
            };
            transports.push(transport);
        }
        let acks = match &config.ack_log {
            Some(path) => AcknowledgmentLog::open(path)?,
            None => AcknowledgmentLog::in_memory(),
        };
        Self::new(JournalFileOptions::from_config(config), transports, acks)
    }

    #[must_use]
    pub const fn options(&self) -> &JournalFileOptions {
        &self.options
    }

    /// Sequence the next entry will get
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.state.lock().next_sequence
    }

    #[must_use]
    pub fn current_file(&self) -> Option<String> {
        self.state.lock().current.as_ref().map(|c| c.filename.clone())
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.state.lock().read_only
    }

    #[must_use]
    pub fn transport_names(&self) -> Vec<String> {
        self.state
            .lock()
            .transports
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Transports behind the newest acknowledged entry
    #[must_use]
    pub fn lagging(&self) -> Vec<String> {
        let state = self.state.lock();
        let Some(last) = state.acks.highest() else {
            return Vec::new();
        };
        state
            .acks
            .lagging(last)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Fail unless the writer can accept another entry
    pub fn check_writable(&self) -> JournalResult<()> {
        let state = self.state.lock();
        state.check_writable()
    }

    /// Assign the next sequence to `entry` and replicate it
    ///
    /// Returns the sequence. A journal file is opened if none is, and the
    /// current one is rotated first if it reached its entry or age limit.
    pub fn write_entry(&self, mut entry: JournalEntry) -> JournalResult<u64> {
        let mut state = self.state.lock();
        state.check_writable()?;

        if let Some(current) = &state.current
            && self.needs_rotation(current, entry.timestamp())
        {
            debug!("rotating journal file {}", current.filename);
            state.close_current()?;
        }
        if state.current.is_none() {
            state.open_file(&self.options, entry.timestamp())?;
        }

        let sequence = state.next_sequence;
        entry.set_sequence(sequence);
        state.broadcast(&TransportRequest::WriteEntry(entry))?;
        state.next_sequence += 1;
        if let Some(current) = state.current.as_mut() {
            current.entries += 1;
        }
        Ok(sequence)
    }

    /// Finish the current journal file, if any
    pub fn close_file(&self) -> JournalResult<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(JournalError::ShutDown);
        }
        if state.current.is_some() {
            state.close_current()?;
        }
        Ok(())
    }

    /// Close the current file and shut every transport down
    ///
    /// All transports are shut down even if one fails; the first failure is
    /// returned.
    pub fn shutdown(&self) -> JournalResult<()> {
        let mut state = self.state.lock();
        if state.shut_down {
            return Err(JournalError::ShutDown);
        }
        let mut first_error = None;
        if state.current.is_some()
            && !state.read_only
            && let Err(e) = state.close_current()
        {
            first_error = Some(e);
        }
        state.current = None;
        for transport in &mut state.transports {
            if let Err(e) = transport.shutdown() {
                warn!("shutting down transport {}: {}", transport.name(), e);
                first_error.get_or_insert(e.into());
            }
        }
        state.shut_down = true;
        info!("journal writer shut down at sequence {}", state.next_sequence);
        first_error.map_or(Ok(()), Err)
    }

    fn needs_rotation(&self, current: &CurrentFile, now: DateTime<Utc>) -> bool {
        if self.options.max_entries_per_file > 0
            && current.entries >= self.options.max_entries_per_file
        {
            return true;
        }
        self.options.max_file_age.is_some_and(|max_age| {
            TimeDelta::from_std(max_age)
                .is_ok_and(|max_age| now.signed_duration_since(current.opened_at) >= max_age)
        })
    }
}

impl WriterState {
    fn check_writable(&self) -> JournalResult<()> {
        if self.shut_down {
            Err(JournalError::ShutDown)
        } else if self.read_only {
            Err(JournalError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn open_file(&mut self, options: &JournalFileOptions, now: DateTime<Utc>) -> JournalResult<()> {
        // File names must sort in creation order
        let timestamp = match self.last_file_time {
            Some(last) if now <= last => last + TimeDelta::milliseconds(1),
            _ => now,
        };
        let filename = options.filename(timestamp);
        self.last_file_time = Some(timestamp);

        self.broadcast(&TransportRequest::OpenFile {
            repository_hash: options.repository_hash.clone(),
            filename: filename.clone(),
            timestamp,
        })?;
        info!("opened journal file {}", filename);
        self.current = Some(CurrentFile {
            filename,
            opened_at: timestamp,
            entries: 0,
        });
        Ok(())
    }

    fn close_current(&mut self) -> JournalResult<()> {
        let result = self.broadcast(&TransportRequest::CloseFile);
        if let Some(current) = self.current.take() {
            info!(
                "closed journal file {} ({} entries)",
                current.filename, current.entries
            );
        }
        result
    }

    /// Apply `request` to every transport in order, stopping at the first
    /// failure
    fn broadcast(&mut self, request: &TransportRequest) -> JournalResult<()> {
        let filename = self
            .current
            .as_ref()
            .map(|c| c.filename.clone())
            .unwrap_or_default();
        let mut failure = None;

        for (index, transport) in self.transports.iter_mut().enumerate() {
            match request.apply(transport.as_mut()) {
                Ok(()) => {
                    if let TransportRequest::WriteEntry(entry) = request {
                        self.acks.record(transport.name(), entry.sequence(), &filename);
                    }
                }
                Err(e) => {
                    failure = Some((index, e));
                    break;
                }
            }
        }

        let saved = if matches!(request, TransportRequest::WriteEntry(_)) {
            self.acks.save()
        } else {
            Ok(())
        };

        let Some((index, source)) = failure else {
            // Without a current log the lagging report and restart point
            // cannot be trusted
            if let Err(e) = saved {
                self.read_only = true;
                error!("cannot save acknowledgment log; journal is now read-only: {}", e);
                return Err(e);
            }
            return Ok(());
        };
        if let Err(e) = saved {
            error!("cannot save acknowledgment log: {}", e);
        }
        self.read_only = true;
        let names: Vec<String> = self
            .transports
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        error!(
            "{} failed on transport {} ({} of {}); journal is now read-only: {}",
            request.kind(),
            names[index],
            index + 1,
            names.len(),
            source
        );
        if index == 0 {
            return Err(JournalError::TotalReplicationFailure { source });
        }
        Err(JournalError::PartialReplication {
            applied: names[..index].to_vec(),
            failed: names[index].clone(),
            not_attempted: names[index + 1..].to_vec(),
            source,
        })
    }
}
