//! Executes management methods against storage

use crate::context::Context;
use crate::entry::{JournalEntry, ManagementMethod};
use crate::error::{JournalError, JournalResult};
use fcrepo_common::{Pid, StoreKey};
use fcrepo_storage::LowlevelStorage;
use std::sync::Arc;
use tracing::debug;

/// Carries out a management call
///
/// `context` is the entry's own context for a live call, and the rebuilt
/// context during replay.
pub trait ManagementDelegate: Send + Sync {
    fn execute(&self, context: &Context, entry: &JournalEntry) -> JournalResult<()>;
}

/// Applies the storage side of management methods to `LowlevelStorage`
///
/// Methods that only touch object metadata or the resource index have no
/// storage effect here and succeed without doing anything.
pub struct StorageDelegate {
    storage: Arc<LowlevelStorage>,
}

impl StorageDelegate {
    #[must_use]
    pub const fn new(storage: Arc<LowlevelStorage>) -> Self {
        Self { storage }
    }

    #[must_use]
    pub fn storage(&self) -> &LowlevelStorage {
        &self.storage
    }

    fn purge_object(&self, pid: &Pid) -> JournalResult<()> {
        for key in self.storage.datastreams_of(pid)? {
            self.storage.remove_datastream(&key)?;
        }
        self.storage.remove_object(pid)?;
        Ok(())
    }

    fn purge_datastream(&self, entry: &JournalEntry, pid: &Pid) -> JournalResult<()> {
        let ds_id = entry.string_arg("dsID")?;
        let versions = entry.string_array_arg("versionIDs")?;
        let keys: Vec<StoreKey> = if versions.is_empty() {
            // No versions named: all of them
            self.storage
                .datastreams_of(pid)?
                .into_iter()
                .filter(|key| matches!(key, StoreKey::Datastream { ds_id: id, .. } if id == ds_id))
                .collect()
        } else {
            versions
                .iter()
                .map(|version| datastream_key(entry, pid, ds_id, version))
                .collect::<JournalResult<_>>()?
        };
        for key in &keys {
            self.storage.remove_datastream(key)?;
        }
        debug!("purged {} versions of {}/{}", keys.len(), pid, ds_id);
        Ok(())
    }
}

fn pid_arg(entry: &JournalEntry) -> JournalResult<Pid> {
    let value = entry.string_arg("pid")?;
    Pid::new(value).map_err(|e| JournalError::Argument {
        sequence: entry.sequence(),
        method: entry.method().to_string(),
        argument: "pid".into(),
        detail: e.to_string(),
    })
}

fn datastream_key(
    entry: &JournalEntry,
    pid: &Pid,
    ds_id: &str,
    version_id: &str,
) -> JournalResult<StoreKey> {
    StoreKey::datastream(pid.clone(), ds_id, version_id).map_err(|e| JournalError::Argument {
        sequence: entry.sequence(),
        method: entry.method().to_string(),
        argument: "dsID".into(),
        detail: e.to_string(),
    })
}

impl ManagementDelegate for StorageDelegate {
    fn execute(&self, _context: &Context, entry: &JournalEntry) -> JournalResult<()> {
        let method = entry.method();
        match method {
            ManagementMethod::Ingest => {
                let pid = pid_arg(entry)?;
                self.storage
                    .add_object(&pid, entry.binary_arg("serialization")?)?;
            }
            ManagementMethod::ModifyObject => {
                let pid = pid_arg(entry)?;
                self.storage
                    .replace_object(&pid, entry.binary_arg("serialization")?)?;
            }
            ManagementMethod::PurgeObject => self.purge_object(&pid_arg(entry)?)?,
            ManagementMethod::AddDatastream
            | ManagementMethod::ModifyDatastreamByValue
            | ManagementMethod::ModifyDatastreamByReference => {
                let pid = pid_arg(entry)?;
                let key = datastream_key(
                    entry,
                    &pid,
                    entry.string_arg("dsID")?,
                    entry.string_arg("versionID")?,
                )?;
                // A by-reference datastream may point at external content
                match entry.argument("content") {
                    Some(_) => {
                        self.storage
                            .add_datastream(&key, entry.binary_arg("content")?)?;
                    }
                    None if method == ManagementMethod::ModifyDatastreamByReference => {
                        debug!("{}: external content, nothing stored", key);
                    }
                    None => {
                        entry.binary_arg("content")?;
                    }
                }
            }
            ManagementMethod::PurgeDatastream => {
                let pid = pid_arg(entry)?;
                self.purge_datastream(entry, &pid)?;
            }
            ManagementMethod::SetDatastreamState
            | ManagementMethod::SetDatastreamVersionable
            | ManagementMethod::AddRelationship
            | ManagementMethod::PurgeRelationship
            | ManagementMethod::GetNextPid
            | ManagementMethod::PutTempStream => {
                debug!("{} has no storage effect", method);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use fcrepo_storage::{FlatPathAlgorithm, MemoryFileSystem, MemoryPathRegistry, Store};
    use parking_lot::Mutex;
    use std::io::Read;

    pub(crate) fn memory_storage() -> Arc<LowlevelStorage> {
        let store = |name: &str| {
            Store::new(
                Arc::new(FlatPathAlgorithm),
                Arc::new(MemoryPathRegistry::new(name)),
                Arc::new(MemoryFileSystem::new()),
            )
        };
        Arc::new(LowlevelStorage::new(store("objects"), store("datastreams")))
    }

    /// Delegate that records the calls it gets
    #[derive(Default)]
    pub(crate) struct RecordingDelegate {
        pub calls: Mutex<Vec<(u64, Context)>>,
        pub fail_on: Option<u64>,
    }

    impl ManagementDelegate for RecordingDelegate {
        fn execute(&self, context: &Context, entry: &JournalEntry) -> JournalResult<()> {
            if self.fail_on == Some(entry.sequence()) {
                return Err(JournalError::Delegate {
                    method: entry.method().to_string(),
                    detail: "refused".into(),
                });
            }
            self.calls.lock().push((entry.sequence(), context.clone()));
            Ok(())
        }
    }

    fn entry(method: ManagementMethod) -> JournalEntry {
        JournalEntry::new(method, Context::new(Utc::now())).with_argument("pid", "demo:1")
    }

    fn read_all(mut r: impl Read) -> Vec<u8> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_object_lifecycle() {
        let storage = memory_storage();
        let delegate = StorageDelegate::new(storage.clone());
        let pid = Pid::new("demo:1").unwrap();
        let run = |e: JournalEntry| delegate.execute(e.context(), &e);

        run(entry(ManagementMethod::Ingest).with_argument("serialization", b"<v1/>".to_vec()))
            .unwrap();
        assert_eq!(read_all(storage.retrieve_object(&pid).unwrap()), b"<v1/>");

        run(entry(ManagementMethod::ModifyObject).with_argument("serialization", b"<v2/>".to_vec()))
            .unwrap();
        assert_eq!(read_all(storage.retrieve_object(&pid).unwrap()), b"<v2/>");

        run(entry(ManagementMethod::AddDatastream)
            .with_argument("dsID", "DC")
            .with_argument("versionID", "DC.0")
            .with_argument("content", b"dc".to_vec()))
        .unwrap();
        assert_eq!(storage.datastreams_of(&pid).unwrap().len(), 1);

        run(entry(ManagementMethod::PurgeObject)).unwrap();
        assert!(!storage.object_exists(&pid).unwrap());
        assert!(storage.datastreams_of(&pid).unwrap().is_empty());
    }

    #[test]
    fn test_purge_datastream_versions() {
        let storage = memory_storage();
        let delegate = StorageDelegate::new(storage.clone());
        let pid = Pid::new("demo:1").unwrap();
        for version in ["DC.0", "DC.1", "DC.2"] {
            let e = entry(ManagementMethod::ModifyDatastreamByValue)
                .with_argument("dsID", "DC")
                .with_argument("versionID", version)
                .with_argument("content", version.as_bytes().to_vec());
            delegate.execute(e.context(), &e).unwrap();
        }

        let e = entry(ManagementMethod::PurgeDatastream)
            .with_argument("dsID", "DC")
            .with_argument("versionIDs", vec!["DC.0".to_string()]);
        delegate.execute(e.context(), &e).unwrap();
        assert_eq!(storage.datastreams_of(&pid).unwrap().len(), 2);

        let e = entry(ManagementMethod::PurgeDatastream)
            .with_argument("dsID", "DC")
            .with_argument("versionIDs", Vec::<String>::new());
        delegate.execute(e.context(), &e).unwrap();
        assert!(storage.datastreams_of(&pid).unwrap().is_empty());
    }

    #[test]
    fn test_bad_arguments() {
        let delegate = StorageDelegate::new(memory_storage());
        let e = JournalEntry::new(ManagementMethod::Ingest, Context::new(Utc::now()))
            .with_argument("pid", "not a pid")
            .with_argument("serialization", b"x".to_vec());
        assert!(matches!(
            delegate.execute(e.context(), &e),
            Err(JournalError::Argument { .. })
        ));

        let e = entry(ManagementMethod::AddDatastream)
            .with_argument("dsID", "DC")
            .with_argument("versionID", "DC.0");
        assert!(matches!(
            delegate.execute(e.context(), &e),
            Err(JournalError::Argument { .. })
        ));

        // Reference content may be external
        let e = entry(ManagementMethod::ModifyDatastreamByReference)
            .with_argument("dsID", "IMG")
            .with_argument("versionID", "IMG.1");
        delegate.execute(e.context(), &e).unwrap();
    }

    #[test]
    fn test_store_errors_propagate() {
        let delegate = StorageDelegate::new(memory_storage());
        let e = entry(ManagementMethod::PurgeObject);
        assert!(matches!(
            delegate.execute(e.context(), &e),
            Err(JournalError::Store(_))
        ));
    }
}
