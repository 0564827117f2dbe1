//! Per-transport acknowledgment log
//!
//! Records the last entry each transport accepted, so an operator can see
//! which followers fell behind after a replication failure. The log is a
//! small JSON document rewritten atomically after every change.

use crate::error::{JournalError, JournalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Last entry a transport accepted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub sequence: u64,
    pub filename: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AcknowledgmentLog {
    /// `None` keeps the log in memory only
    path: Option<PathBuf>,
    transports: BTreeMap<String, Option<Acknowledgment>>,
}

impl AcknowledgmentLog {
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            path: None,
            transports: BTreeMap::new(),
        }
    }

    /// Load the log at `path`, or start an empty one if it does not exist
    pub fn open(path: impl Into<PathBuf>) -> JournalResult<Self> {
        let path = path.into();
        let transports = match fs::read(&path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| JournalError::AckLog {
                path: path.clone(),
                detail: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            transports,
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Make sure `name` appears in the log, even before its first entry
    pub fn register(&mut self, name: &str) {
        self.transports.entry(name.to_string()).or_insert(None);
    }

    pub fn record(&mut self, name: &str, sequence: u64, filename: &str) {
        self.transports.insert(
            name.to_string(),
            Some(Acknowledgment {
                sequence,
                filename: filename.to_string(),
                at: Utc::now(),
            }),
        );
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Acknowledgment> {
        self.transports.get(name).and_then(Option::as_ref)
    }

    /// Highest sequence any transport acknowledged
    #[must_use]
    pub fn highest(&self) -> Option<u64> {
        self.transports
            .values()
            .flatten()
            .map(|ack| ack.sequence)
            .max()
    }

    /// Transports that have not acknowledged `sequence`
    #[must_use]
    pub fn lagging(&self, sequence: u64) -> Vec<&str> {
        self.transports
            .iter()
            .filter(|(_, ack)| ack.as_ref().is_none_or(|a| a.sequence < sequence))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Acknowledgment>)> {
        self.transports
            .iter()
            .map(|(name, ack)| (name.as_str(), ack.as_ref()))
    }

    /// Write the log through a temporary file and rename it into place
    pub fn save(&self) -> JournalResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let ack_err = |detail: String| JournalError::AckLog {
            path: path.clone(),
            detail,
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| ack_err(e.to_string()))?;
        let json =
            serde_json::to_vec_pretty(&self.transports).map_err(|e| ack_err(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ack_err(e.to_string()))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| ack_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| ack_err(e.error.to_string()))?;
        debug!("saved acknowledgment log {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lagging_transports() {
        let mut log = AcknowledgmentLog::in_memory();
        log.register("local");
        log.register("remote");
        log.register("backup");
        assert_eq!(log.lagging(1), vec!["backup", "local", "remote"]);
        assert_eq!(log.highest(), None);

        log.record("local", 7, "j1.xml");
        log.record("remote", 6, "j1.xml");
        assert_eq!(log.highest(), Some(7));
        assert_eq!(log.lagging(7), vec!["backup", "remote"]);
        assert!(log.lagging(6).contains(&"backup"));
        assert!(!log.lagging(6).contains(&"remote"));
        assert_eq!(log.get("local").unwrap().filename, "j1.xml");
        assert!(log.get("backup").is_none());
    }

    #[test]
    fn test_save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acks.json");

        let mut log = AcknowledgmentLog::open(&path).unwrap();
        log.register("local");
        log.register("remote");
        log.record("local", 3, "j.xml");
        log.save().unwrap();

        let reopened = AcknowledgmentLog::open(&path).unwrap();
        assert_eq!(reopened.get("local"), log.get("local"));
        assert_eq!(reopened.lagging(3), vec!["remote"]);
        assert_eq!(reopened.iter().count(), 2);
    }

    #[test]
    fn test_corrupt_log_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acks.json");
        fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            AcknowledgmentLog::open(&path),
            Err(JournalError::AckLog { .. })
        ));
    }
}
