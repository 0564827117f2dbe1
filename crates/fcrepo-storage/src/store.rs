//! Content store
//!
//! Combines a path algorithm, a path registry and a file system into a
//! keyed content store. The registry is the record of what exists: a key
//! is present iff it has a binding and the bound file is on disk.
//!
//! # Write ordering
//! - `add`: write the file (create-only), then register it. If registration
//!   fails the file is deleted again; if that also fails the orphan is
//!   logged and `audit_registry` will report it.
//! - `remove`: delete the file, then the binding. A crash in between leaves
//!   a binding without a file, which `audit_files` reports.
//!
//! The store does no per-key locking. Callers serialize operations on the
//! same key; operations on different keys are independent.

use crate::error::{FsError, RegistryError, StoreError, StoreResult};
use crate::fs::FileSystem;
use crate::path::{PathAlgorithm, StoredPath};
use crate::registry::PathRegistry;
use fcrepo_common::StoreKey;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A disagreement between the registry and the file system
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Discrepancy {
    /// Registry binding whose file is missing
    MissingFile { key: StoreKey, path: StoredPath },
    /// File no binding refers to
    Orphan { path: StoredPath, key: StoreKey },
    /// File whose key is bound to a different path
    PathMismatch {
        key: StoreKey,
        registered: StoredPath,
        found: StoredPath,
    },
    /// File whose name does not decode to a key
    Unrecognized { path: StoredPath },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFile { key, path } => write!(f, "{key}: file {path} is missing"),
            Self::Orphan { path, key } => write!(f, "{path}: no registry entry for {key}"),
            Self::PathMismatch {
                key,
                registered,
                found,
            } => write!(f, "{key}: registered at {registered}, found at {found}"),
            Self::Unrecognized { path } => write!(f, "{path}: not a store file"),
        }
    }
}

/// Result of an audit pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Registry entries or files examined
    pub checked: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl AuditReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }

    /// Keys named by the discrepancies, in report order
    #[must_use]
    pub fn keys(&self) -> Vec<&StoreKey> {
        self.discrepancies
            .iter()
            .filter_map(|d| match d {
                Discrepancy::MissingFile { key, .. }
                | Discrepancy::Orphan { key, .. }
                | Discrepancy::PathMismatch { key, .. } => Some(key),
                Discrepancy::Unrecognized { .. } => None,
            })
            .collect()
    }
}

/// Result of a registry rebuild
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Bindings written
    pub registered: usize,
    /// Files whose names do not decode to a key
    pub skipped: Vec<StoredPath>,
    /// Extra files for a key that was already bound, with the path not used
    pub duplicates: Vec<(StoreKey, StoredPath)>,
}

/// Keyed content store
pub struct Store {
    algorithm: Arc<dyn PathAlgorithm>,
    registry: Arc<dyn PathRegistry>,
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("algorithm", &self.algorithm.name())
            .field("registry", &self.registry.name())
            .field("filesystem", &self.fs.name())
            .finish()
    }
}

impl Store {
    pub fn new(
        algorithm: Arc<dyn PathAlgorithm>,
        registry: Arc<dyn PathRegistry>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            algorithm,
            registry,
            fs,
        }
    }

    /// Registry name, used to tell stores apart in logs
    #[must_use]
    pub fn name(&self) -> &str {
        self.registry.name()
    }

    fn lookup(&self, key: &StoreKey, op: &'static str) -> StoreResult<Option<StoredPath>> {
        self.registry.get(key).map_err(|source| StoreError::Registry {
            key: key.clone(),
            op,
            source,
        })
    }

    fn require(&self, key: &StoreKey, op: &'static str) -> StoreResult<StoredPath> {
        self.lookup(key, op)?
            .ok_or_else(|| StoreError::NotFound { key: key.clone() })
    }

    fn fs_error(key: &StoreKey, op: &'static str, path: &StoredPath, e: FsError) -> StoreError {
        match e {
            FsError::NotFound(_) => {
                error!(
                    "{}: registry binds {} to {} but the file is missing",
                    op, key, path
                );
                StoreError::Inconsistent {
                    key: key.clone(),
                    path: path.clone(),
                    detail: "registered file is missing".into(),
                }
            }
            source => StoreError::FileSystem {
                key: key.clone(),
                op,
                source,
            },
        }
    }

    /// Store new content; `AlreadyExists` if the key is present
    pub fn add(&self, key: &StoreKey, mut content: impl Read) -> StoreResult<u64> {
        if self.exists(key)? {
            return Err(StoreError::AlreadyExists { key: key.clone() });
        }

        let path = self
            .algorithm
            .path_for(key)
            .map_err(|source| StoreError::Path {
                key: key.clone(),
                op: "add",
                source,
            })?;

        let written = match self.fs.write(&path, &mut content) {
            Ok(n) => n,
            Err(FsError::AlreadyExists(_)) => {
                error!(
                    "add {}: unregistered file already present at {}",
                    key, path
                );
                return Err(StoreError::Inconsistent {
                    key: key.clone(),
                    path,
                    detail: "unregistered file already present".into(),
                });
            }
            Err(source) => {
                return Err(StoreError::FileSystem {
                    key: key.clone(),
                    op: "add",
                    source,
                });
            }
        };

        if let Err(source) = self.registry.put(key, &path) {
            match self.fs.delete(&path) {
                Ok(()) => warn!("add {}: registration failed, removed {}", key, path),
                Err(e) => error!(
                    "add {}: registration failed and {} could not be removed ({}); \
                     audit_registry will report it",
                    key, path, e
                ),
            }
            return Err(StoreError::Registry {
                key: key.clone(),
                op: "add",
                source,
            });
        }

        debug!("{}: added {} ({} bytes)", self.name(), key, written);
        Ok(written)
    }

    /// Overwrite existing content; `NotFound` if the key is absent
    pub fn replace(&self, key: &StoreKey, mut content: impl Read) -> StoreResult<u64> {
        let path = self.require(key, "replace")?;
        let written = self
            .fs
            .rewrite(&path, &mut content)
            .map_err(|e| Self::fs_error(key, "replace", &path, e))?;
        debug!("{}: replaced {} ({} bytes)", self.name(), key, written);
        Ok(written)
    }

    /// Open stored content for reading
    pub fn retrieve(&self, key: &StoreKey) -> StoreResult<Box<dyn Read + Send>> {
        let path = self.require(key, "retrieve")?;
        self.fs
            .read(&path)
            .map_err(|e| Self::fs_error(key, "retrieve", &path, e))
    }

    /// Delete stored content; `NotFound` if the key is absent
    pub fn remove(&self, key: &StoreKey) -> StoreResult<()> {
        let path = self.require(key, "remove")?;

        // A missing file leaves the binding in place for audit and rebuild
        self.fs
            .delete(&path)
            .map_err(|e| Self::fs_error(key, "remove", &path, e))?;

        self.registry.remove(key).map_err(|source| match source {
            RegistryError::NotFound(_) => StoreError::NotFound { key: key.clone() },
            source => StoreError::Registry {
                key: key.clone(),
                op: "remove",
                source,
            },
        })?;

        debug!("{}: removed {}", self.name(), key);
        Ok(())
    }

    /// Whether `key` is present
    ///
    /// A binding whose file is missing is an `Inconsistent` error, never
    /// `false`.
    pub fn exists(&self, key: &StoreKey) -> StoreResult<bool> {
        let Some(path) = self.lookup(key, "exists")? else {
            return Ok(false);
        };
        match self.fs.exists(&path) {
            Ok(true) => Ok(true),
            Ok(false) => Err(Self::fs_error(
                key,
                "exists",
                &path,
                FsError::NotFound(path.clone()),
            )),
            Err(source) => Err(StoreError::FileSystem {
                key: key.clone(),
                op: "exists",
                source,
            }),
        }
    }

    /// Size of stored content in bytes
    pub fn size(&self, key: &StoreKey) -> StoreResult<u64> {
        let path = self.require(key, "size")?;
        self.fs
            .size(&path)
            .map_err(|e| Self::fs_error(key, "size", &path, e))
    }

    /// Snapshot of every registered key
    pub fn keys(&self) -> StoreResult<Vec<StoreKey>> {
        self.registry
            .keys()
            .map(|keys| keys.collect())
            .map_err(|e| StoreError::Maintenance {
                op: "keys",
                detail: e.to_string(),
            })
    }

    /// Check that every registry entry's file exists
    pub fn audit_files(&self) -> StoreResult<AuditReport> {
        let entries = self
            .registry
            .entries()
            .map_err(|e| StoreError::Maintenance {
                op: "audit_files",
                detail: e.to_string(),
            })?;

        let mut report = AuditReport {
            checked: entries.len(),
            ..AuditReport::default()
        };
        for (key, path) in entries {
            let present = self.fs.exists(&path).map_err(|e| StoreError::Maintenance {
                op: "audit_files",
                detail: e.to_string(),
            })?;
            if !present {
                let d = Discrepancy::MissingFile { key, path };
                warn!("{}: audit: {}", self.name(), d);
                report.discrepancies.push(d);
            }
        }

        info!(
            "{}: audited {} registry entries, {} missing files",
            self.name(),
            report.checked,
            report.discrepancies.len()
        );
        Ok(report)
    }

    /// Check that every file under the root has a registry entry
    pub fn audit_registry(&self) -> StoreResult<AuditReport> {
        let entries = self
            .registry
            .entries()
            .map_err(|e| StoreError::Maintenance {
                op: "audit_registry",
                detail: e.to_string(),
            })?;
        let files = self.fs.walk().map_err(|e| StoreError::Maintenance {
            op: "audit_registry",
            detail: e.to_string(),
        })?;

        let by_path: HashMap<&StoredPath, &StoreKey> = entries.iter().map(|(k, p)| (p, k)).collect();
        let by_key: HashMap<&StoreKey, &StoredPath> = entries.iter().map(|(k, p)| (k, p)).collect();

        let mut report = AuditReport {
            checked: files.len(),
            ..AuditReport::default()
        };
        for path in &files {
            if by_path.contains_key(path) {
                continue;
            }
            let d = match StoreKey::from_filename(path.file_name()) {
                Ok(key) => match by_key.get(&key) {
                    Some(registered) => Discrepancy::PathMismatch {
                        registered: (*registered).clone(),
                        found: path.clone(),
                        key,
                    },
                    None => Discrepancy::Orphan {
                        path: path.clone(),
                        key,
                    },
                },
                Err(_) => Discrepancy::Unrecognized { path: path.clone() },
            };
            warn!("{}: audit: {}", self.name(), d);
            report.discrepancies.push(d);
        }

        info!(
            "{}: audited {} files, {} without registry entries",
            self.name(),
            report.checked,
            report.discrepancies.len()
        );
        Ok(report)
    }

    /// Regenerate the registry from the files under the root
    ///
    /// Destructive: every existing binding is dropped first. The store must
    /// be quiesced while this runs. When several files decode to the same
    /// key, the one at the path the current algorithm produces wins,
    /// otherwise the first in walk order.
    pub fn rebuild(&self) -> StoreResult<RebuildReport> {
        let maintenance = |detail: String| StoreError::Maintenance {
            op: "rebuild",
            detail,
        };

        let files = self.fs.walk().map_err(|e| maintenance(e.to_string()))?;
        info!(
            "{}: rebuilding registry from {} files",
            self.name(),
            files.len()
        );

        let mut report = RebuildReport::default();
        let mut chosen: BTreeMap<StoreKey, StoredPath> = BTreeMap::new();
        for path in files {
            let key = match StoreKey::from_filename(path.file_name()) {
                Ok(key) => key,
                Err(e) => {
                    warn!("{}: rebuild: skipping {} ({})", self.name(), path, e);
                    report.skipped.push(path);
                    continue;
                }
            };

            let Some(existing) = chosen.get(&key).cloned() else {
                chosen.insert(key, path);
                continue;
            };
            let preferred = self.algorithm.path_for(&key).ok();
            let (keep, drop) = if preferred.as_ref() == Some(&path) {
                (path, existing)
            } else {
                (existing, path)
            };
            warn!(
                "{}: rebuild: {} has several files, using {} over {}",
                self.name(),
                key,
                keep,
                drop
            );
            report.duplicates.push((key.clone(), drop));
            chosen.insert(key, keep);
        }

        self.registry
            .clear()
            .map_err(|e| maintenance(e.to_string()))?;
        for (key, path) in &chosen {
            self.registry
                .put(key, path)
                .map_err(|e| maintenance(format!("{key}: {e}")))?;
            report.registered += 1;
        }

        info!(
            "{}: rebuild registered {} keys, skipped {} files, {} duplicates",
            self.name(),
            report.registered,
            report.skipped.len(),
            report.duplicates.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryResult;
    use crate::fs::{LocalFileSystem, MemoryFileSystem};
    use crate::path::{FlatPathAlgorithm, HashPathAlgorithm};
    use crate::registry::{MemoryPathRegistry, RedbPathRegistry};
    use std::io::Cursor;

    fn key(s: &str) -> StoreKey {
        StoreKey::parse(s).unwrap()
    }

    fn memory_store() -> Store {
        Store::new(
            Arc::new(HashPathAlgorithm::default()),
            Arc::new(MemoryPathRegistry::new("objectPaths")),
            Arc::new(MemoryFileSystem::new()),
        )
    }

    fn read_all(store: &Store, k: &StoreKey) -> Vec<u8> {
        let mut buf = Vec::new();
        store.retrieve(k).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_lifecycle_example() {
        let store = memory_store();
        let k = key("demo:1");

        assert_eq!(store.add(&k, Cursor::new(b"hello")).unwrap(), 5);
        assert_eq!(store.size(&k).unwrap(), 5);
        assert_eq!(read_all(&store, &k), b"hello");
        assert!(store.exists(&k).unwrap());

        store.remove(&k).unwrap();
        assert!(!store.exists(&k).unwrap());
    }

    #[test]
    fn test_add_existing_fails_and_keeps_content() {
        let store = memory_store();
        let k = key("demo:1");
        store.add(&k, Cursor::new(b"original")).unwrap();

        let err = store.add(&k, Cursor::new(b"other")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
        assert_eq!(read_all(&store, &k), b"original");
    }

    #[test]
    fn test_missing_key_operations() {
        let store = memory_store();
        let k = key("demo:404");

        assert!(store.replace(&k, Cursor::new(b"x")).unwrap_err().is_not_found());
        assert!(store.remove(&k).unwrap_err().is_not_found());
        assert!(store.retrieve(&k).err().unwrap().is_not_found());
        assert!(store.size(&k).unwrap_err().is_not_found());
        assert!(!store.exists(&k).unwrap());
    }

    #[test]
    fn test_replace() {
        let store = memory_store();
        let k = key("demo:1+DC+DC.0");
        store.add(&k, Cursor::new(b"v1")).unwrap();
        assert_eq!(store.replace(&k, Cursor::new(b"version 2")).unwrap(), 9);
        assert_eq!(read_all(&store, &k), b"version 2");
        assert_eq!(store.size(&k).unwrap(), 9);
    }

    #[test]
    fn test_missing_file_is_inconsistency() {
        let fs = Arc::new(MemoryFileSystem::new());
        let algorithm = Arc::new(FlatPathAlgorithm);
        let store = Store::new(
            algorithm.clone(),
            Arc::new(MemoryPathRegistry::new("objectPaths")),
            fs.clone(),
        );
        let k = key("demo:1");
        store.add(&k, Cursor::new(b"hello")).unwrap();

        fs.delete(&algorithm.path_for(&k).unwrap()).unwrap();

        assert!(store.exists(&k).unwrap_err().is_inconsistency());
        assert!(store.retrieve(&k).err().unwrap().is_inconsistency());
        assert!(store.size(&k).unwrap_err().is_inconsistency());
        assert!(store.add(&k, Cursor::new(b"again")).unwrap_err().is_inconsistency());
    }

    #[test]
    fn test_remove_stale_binding_is_inconsistency() {
        let fs = Arc::new(MemoryFileSystem::new());
        let registry = Arc::new(MemoryPathRegistry::new("objectPaths"));
        let algorithm = Arc::new(FlatPathAlgorithm);
        let store = Store::new(algorithm.clone(), registry.clone(), fs.clone());
        let k = key("demo:1");
        store.add(&k, Cursor::new(b"hello")).unwrap();
        fs.delete(&algorithm.path_for(&k).unwrap()).unwrap();

        assert!(store.remove(&k).unwrap_err().is_inconsistency());
        // binding kept so the audit still sees it
        assert!(registry.get(&k).unwrap().is_some());
        assert_eq!(store.audit_files().unwrap().discrepancies.len(), 1);
    }

    #[test]
    fn test_add_over_orphan_file_is_inconsistency() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = Store::new(
            Arc::new(FlatPathAlgorithm),
            Arc::new(MemoryPathRegistry::new("objectPaths")),
            fs.clone(),
        );
        fs.write(&StoredPath::new("demo_1").unwrap(), &mut Cursor::new(b"stray"))
            .unwrap();

        let err = store.add(&key("demo:1"), Cursor::new(b"new")).unwrap_err();
        assert!(err.is_inconsistency());
    }

    /// Registry that accepts reads but refuses writes
    struct ReadOnlyRegistry(MemoryPathRegistry);

    impl PathRegistry for ReadOnlyRegistry {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn put(&self, _key: &StoreKey, _path: &StoredPath) -> RegistryResult<()> {
            Err(RegistryError::Io(std::io::Error::other("registry is read-only")))
        }
        fn get(&self, key: &StoreKey) -> RegistryResult<Option<StoredPath>> {
            self.0.get(key)
        }
        fn remove(&self, key: &StoreKey) -> RegistryResult<()> {
            self.0.remove(key)
        }
        fn entries(&self) -> RegistryResult<Vec<(StoreKey, StoredPath)>> {
            self.0.entries()
        }
        fn clear(&self) -> RegistryResult<()> {
            self.0.clear()
        }
    }

    #[test]
    fn test_failed_registration_removes_file() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = Store::new(
            Arc::new(HashPathAlgorithm::default()),
            Arc::new(ReadOnlyRegistry(MemoryPathRegistry::new("objectPaths"))),
            fs.clone(),
        );

        let err = store.add(&key("demo:1"), Cursor::new(b"hello")).unwrap_err();
        assert!(matches!(err, StoreError::Registry { op: "add", .. }));
        assert!(fs.walk().unwrap().is_empty());
    }

    #[test]
    fn test_audit_files_reports_deleted_file() {
        let fs = Arc::new(MemoryFileSystem::new());
        let algorithm = Arc::new(HashPathAlgorithm::default());
        let store = Store::new(
            algorithm.clone(),
            Arc::new(MemoryPathRegistry::new("objectPaths")),
            fs.clone(),
        );

        for i in 1..=5 {
            store
                .add(&key(&format!("demo:{i}")), Cursor::new(b"content"))
                .unwrap();
        }
        store.remove(&key("demo:2")).unwrap();

        let report = store.audit_files().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.checked, 4);
        assert!(store.audit_registry().unwrap().is_clean());

        let victim = key("demo:4");
        fs.delete(&algorithm.path_for(&victim).unwrap()).unwrap();

        let report = store.audit_files().unwrap();
        assert_eq!(report.keys(), vec![&victim]);
    }

    #[test]
    fn test_audit_registry_reports_orphans() {
        let fs = Arc::new(MemoryFileSystem::new());
        let registry = Arc::new(MemoryPathRegistry::new("objectPaths"));
        let store = Store::new(Arc::new(FlatPathAlgorithm), registry.clone(), fs.clone());

        store.add(&key("demo:1"), Cursor::new(b"a")).unwrap();
        fs.write(&StoredPath::new("demo_2").unwrap(), &mut Cursor::new(b"b"))
            .unwrap();
        fs.write(&StoredPath::new("junk.txt").unwrap(), &mut Cursor::new(b"c"))
            .unwrap();
        fs.write(&StoredPath::new("old/demo_1").unwrap(), &mut Cursor::new(b"d"))
            .unwrap();

        let report = store.audit_registry().unwrap();
        assert_eq!(report.checked, 4);
        assert_eq!(
            report.discrepancies,
            vec![
                Discrepancy::Orphan {
                    path: StoredPath::new("demo_2").unwrap(),
                    key: key("demo:2"),
                },
                Discrepancy::Unrecognized {
                    path: StoredPath::new("junk.txt").unwrap(),
                },
                Discrepancy::PathMismatch {
                    key: key("demo:1"),
                    registered: StoredPath::new("demo_1").unwrap(),
                    found: StoredPath::new("old/demo_1").unwrap(),
                },
            ]
        );
    }

    #[test]
    fn test_rebuild_after_registry_loss() {
        let dir = tempfile::tempdir().unwrap();
        let fs: Arc<dyn FileSystem> =
            Arc::new(LocalFileSystem::new(dir.path().join("objects")).unwrap());
        let algorithm: Arc<dyn PathAlgorithm> = Arc::new(HashPathAlgorithm::default());

        let keys: Vec<StoreKey> = ["demo:1", "demo:2", "demo:3+DC+DC.0", "other:x%2Fy"]
            .iter()
            .map(|s| key(s))
            .collect();
        {
            let registry = RedbPathRegistry::open(dir.path().join("a.redb"), "objectPaths").unwrap();
            let store = Store::new(algorithm.clone(), Arc::new(registry), fs.clone());
            for k in &keys {
                store.add(k, Cursor::new(k.to_string().into_bytes())).unwrap();
            }
            store.remove(&keys[1]).unwrap();
        }

        // registry database lost; start over with a fresh one
        let registry = RedbPathRegistry::open(dir.path().join("b.redb"), "objectPaths").unwrap();
        let store = Store::new(algorithm, Arc::new(registry), fs);
        assert!(!store.exists(&keys[0]).unwrap());

        let report = store.rebuild().unwrap();
        assert_eq!(report.registered, 3);
        assert!(report.skipped.is_empty());

        for k in [&keys[0], &keys[2], &keys[3]] {
            assert!(store.exists(k).unwrap());
            assert_eq!(read_all(&store, k), k.to_string().into_bytes());
        }
        assert!(!store.exists(&keys[1]).unwrap());
        assert!(store.audit_files().unwrap().is_clean());
        assert!(store.audit_registry().unwrap().is_clean());
    }

    #[test]
    fn test_rebuild_finds_dotted_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new(dir.path()).unwrap());
        let algorithm: Arc<dyn PathAlgorithm> = Arc::new(FlatPathAlgorithm);
        let keys = [key(".stage-x:1"), key(".hidden:2"), key("-x:3")];

        let first = Store::new(
            algorithm.clone(),
            Arc::new(MemoryPathRegistry::new("objectPaths")),
            fs.clone(),
        );
        for k in &keys {
            first.add(k, Cursor::new(b"x")).unwrap();
        }

        let store = Store::new(
            algorithm,
            Arc::new(MemoryPathRegistry::new("objectPaths")),
            fs,
        );
        assert_eq!(store.audit_registry().unwrap().discrepancies.len(), 3);
        assert_eq!(store.rebuild().unwrap().registered, 3);
        for k in &keys {
            assert!(store.exists(k).unwrap());
        }
    }

    #[test]
    fn test_rebuild_prefers_algorithm_path() {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = Store::new(
            Arc::new(FlatPathAlgorithm),
            Arc::new(MemoryPathRegistry::new("objectPaths")),
            fs.clone(),
        );
        fs.write(&StoredPath::new("aa/demo_1").unwrap(), &mut Cursor::new(b"old"))
            .unwrap();
        fs.write(&StoredPath::new("demo_1").unwrap(), &mut Cursor::new(b"new"))
            .unwrap();
        fs.write(&StoredPath::new("README").unwrap(), &mut Cursor::new(b"?"))
            .unwrap();

        let report = store.rebuild().unwrap();
        assert_eq!(report.registered, 1);
        assert_eq!(report.skipped, vec![StoredPath::new("README").unwrap()]);
        assert_eq!(
            report.duplicates,
            vec![(key("demo:1"), StoredPath::new("aa/demo_1").unwrap())]
        );
        assert_eq!(read_all(&store, &key("demo:1")), b"new");
    }

    #[test]
    fn test_concurrent_adds_on_distinct_keys() {
        let store = Arc::new(memory_store());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let k = key(&format!("t{t}:{i}"));
                        store.add(&k, Cursor::new(vec![t as u8; i + 1])).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.keys().unwrap().len(), 200);
        assert_eq!(store.size(&key("t3:9")).unwrap(), 10);
    }
}
