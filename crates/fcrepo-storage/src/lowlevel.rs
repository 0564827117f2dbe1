//! Object and datastream storage
//!
//! Digital object XML lives in one store keyed by PID, datastream content in
//! another keyed by `pid+dsId+versionId`. Each store has its own registry.

use crate::error::{StoreError, StoreResult};
use crate::factory::StoreFactory;
use crate::store::{AuditReport, RebuildReport, Store};
use fcrepo_common::config::StorageConfig;
use fcrepo_common::{Pid, StoreKey};
use std::io::Read;
use tracing::info;

/// Both halves of an audit, per store
#[derive(Clone, Debug, Default)]
pub struct StorageAudit {
    pub object_files: AuditReport,
    pub object_registry: AuditReport,
    pub datastream_files: AuditReport,
    pub datastream_registry: AuditReport,
}

impl StorageAudit {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.object_files.is_clean()
            && self.object_registry.is_clean()
            && self.datastream_files.is_clean()
            && self.datastream_registry.is_clean()
    }
}

/// Object store plus datastream store
#[derive(Debug)]
pub struct LowlevelStorage {
    objects: Store,
    datastreams: Store,
}

fn require_datastream(key: &StoreKey) -> StoreResult<()> {
    if key.is_datastream() {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(
            fcrepo_common::PidError::InvalidDatastreamKey(key.to_string()),
        ))
    }
}

impl LowlevelStorage {
    pub const fn new(objects: Store, datastreams: Store) -> Self {
        Self {
            objects,
            datastreams,
        }
    }

    /// Build both stores from configuration
    pub fn from_config(config: &StorageConfig) -> StoreResult<Self> {
        let mut factory = StoreFactory::new();
        let objects = factory.build(&config.objects)?;
        let datastreams = factory.build(&config.datastreams)?;
        info!(
            "low-level storage ready ({} / {})",
            objects.name(),
            datastreams.name()
        );
        Ok(Self::new(objects, datastreams))
    }

    #[must_use]
    pub const fn objects(&self) -> &Store {
        &self.objects
    }

    #[must_use]
    pub const fn datastreams(&self) -> &Store {
        &self.datastreams
    }

    pub fn add_object(&self, pid: &Pid, content: impl Read) -> StoreResult<u64> {
        self.objects.add(&StoreKey::object(pid.clone()), content)
    }

    pub fn replace_object(&self, pid: &Pid, content: impl Read) -> StoreResult<u64> {
        self.objects.replace(&StoreKey::object(pid.clone()), content)
    }

    pub fn retrieve_object(&self, pid: &Pid) -> StoreResult<Box<dyn Read + Send>> {
        self.objects.retrieve(&StoreKey::object(pid.clone()))
    }

    pub fn remove_object(&self, pid: &Pid) -> StoreResult<()> {
        self.objects.remove(&StoreKey::object(pid.clone()))
    }

    pub fn object_exists(&self, pid: &Pid) -> StoreResult<bool> {
        self.objects.exists(&StoreKey::object(pid.clone()))
    }

    pub fn add_datastream(&self, key: &StoreKey, content: impl Read) -> StoreResult<u64> {
        require_datastream(key)?;
        self.datastreams.add(key, content)
    }

    pub fn replace_datastream(&self, key: &StoreKey, content: impl Read) -> StoreResult<u64> {
        require_datastream(key)?;
        self.datastreams.replace(key, content)
    }

    pub fn retrieve_datastream(&self, key: &StoreKey) -> StoreResult<Box<dyn Read + Send>> {
        require_datastream(key)?;
        self.datastreams.retrieve(key)
    }

    pub fn remove_datastream(&self, key: &StoreKey) -> StoreResult<()> {
        require_datastream(key)?;
        self.datastreams.remove(key)
    }

    /// Every stored datastream version belonging to `pid`
    pub fn datastreams_of(&self, pid: &Pid) -> StoreResult<Vec<StoreKey>> {
        Ok(self
            .datastreams
            .keys()?
            .into_iter()
            .filter(|k| k.pid() == pid)
            .collect())
    }

    /// Audit both stores in both directions
    pub fn audit(&self) -> StoreResult<StorageAudit> {
        Ok(StorageAudit {
            object_files: self.objects.audit_files()?,
            object_registry: self.objects.audit_registry()?,
            datastream_files: self.datastreams.audit_files()?,
            datastream_registry: self.datastreams.audit_registry()?,
        })
    }

    /// Rebuild both registries; returns (objects, datastreams)
    pub fn rebuild(&self) -> StoreResult<(RebuildReport, RebuildReport)> {
        Ok((self.objects.rebuild()?, self.datastreams.rebuild()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcrepo_common::config::{FileSystemKind, PathRegistryKind, StoreConfig};
    use std::io::Cursor;

    fn memory_config() -> StorageConfig {
        let mut objects = StoreConfig::new("objects", "objectPaths");
        objects.filesystem = FileSystemKind::Memory;
        objects.path_registry = PathRegistryKind::Memory;
        let mut datastreams = StoreConfig::new("datastreams", "datastreamPaths");
        datastreams.filesystem = FileSystemKind::Memory;
        datastreams.path_registry = PathRegistryKind::Memory;
        StorageConfig {
            objects,
            datastreams,
        }
    }

    #[test]
    fn test_objects_and_datastreams_are_separate() {
        let storage = LowlevelStorage::from_config(&memory_config()).unwrap();
        let pid = Pid::new("demo:1").unwrap();
        let ds = StoreKey::datastream(pid.clone(), "DC", "DC.0").unwrap();

        storage.add_object(&pid, Cursor::new(b"<foxml/>")).unwrap();
        storage.add_datastream(&ds, Cursor::new(b"<dc/>")).unwrap();

        assert!(storage.object_exists(&pid).unwrap());
        assert!(!storage.datastreams().exists(&StoreKey::object(pid.clone())).unwrap());
        assert_eq!(storage.datastreams_of(&pid).unwrap(), vec![ds.clone()]);

        let mut body = String::new();
        storage
            .retrieve_datastream(&ds)
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "<dc/>");

        storage.remove_object(&pid).unwrap();
        assert!(!storage.object_exists(&pid).unwrap());
        assert_eq!(storage.datastreams_of(&pid).unwrap().len(), 1);
    }

    #[test]
    fn test_object_key_rejected_by_datastream_store() {
        let storage = LowlevelStorage::from_config(&memory_config()).unwrap();
        let key = StoreKey::parse("demo:1").unwrap();
        let err = storage
            .add_datastream(&key, Cursor::new(b"x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKey(_)));
    }

    #[test]
    fn test_audit_and_rebuild_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            objects: StoreConfig::new(dir.path().join("objects"), "objectPaths"),
            datastreams: StoreConfig::new(dir.path().join("datastreams"), "datastreamPaths"),
        };
        let storage = LowlevelStorage::from_config(&config).unwrap();
        let pid = Pid::new("demo:7").unwrap();
        storage.add_object(&pid, Cursor::new(b"obj")).unwrap();
        storage
            .add_datastream(
                &StoreKey::datastream(pid.clone(), "IMG", "IMG.1").unwrap(),
                Cursor::new(b"png"),
            )
            .unwrap();

        assert!(storage.audit().unwrap().is_clean());

        let (objects, datastreams) = storage.rebuild().unwrap();
        assert_eq!(objects.registered, 1);
        assert_eq!(datastreams.registered, 1);
        assert!(storage.object_exists(&pid).unwrap());
    }
}
