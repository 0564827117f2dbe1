//! Path registry
//!
//! Persistent `StoreKey -> StoredPath` bindings kept apart from the files
//! themselves. The store treats the registry as the record of what exists;
//! audit compares it against the file system and rebuild regenerates it.
//!
//! Removing a key that has no binding is an error (`RegistryError::NotFound`)
//! rather than a no-op, so a double remove is visible to the caller.

mod memory;
mod redb;

pub use self::memory::MemoryPathRegistry;
pub use self::redb::RedbPathRegistry;

use crate::error::RegistryResult;
use crate::path::StoredPath;
use fcrepo_common::StoreKey;

/// Key to path index
pub trait PathRegistry: Send + Sync {
    /// Registry (table) name
    fn name(&self) -> &str;

    /// Insert or overwrite a binding
    fn put(&self, key: &StoreKey, path: &StoredPath) -> RegistryResult<()>;

    fn get(&self, key: &StoreKey) -> RegistryResult<Option<StoredPath>>;

    fn exists(&self, key: &StoreKey) -> RegistryResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Delete a binding; `NotFound` if there is none
    fn remove(&self, key: &StoreKey) -> RegistryResult<()>;

    /// All bindings as of the call, sorted by key
    ///
    /// Later mutations are not reflected in the returned snapshot.
    fn entries(&self) -> RegistryResult<Vec<(StoreKey, StoredPath)>>;

    /// All keys as of the call, sorted
    fn keys(&self) -> RegistryResult<std::vec::IntoIter<StoreKey>> {
        let keys: Vec<StoreKey> = self.entries()?.into_iter().map(|(k, _)| k).collect();
        Ok(keys.into_iter())
    }

    /// Number of bindings
    fn len(&self) -> RegistryResult<usize> {
        Ok(self.entries()?.len())
    }

    fn is_empty(&self) -> RegistryResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop every binding
    fn clear(&self) -> RegistryResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use std::sync::Arc;

    fn key(s: &str) -> StoreKey {
        StoreKey::parse(s).unwrap()
    }

    fn path(s: &str) -> StoredPath {
        StoredPath::new(s).unwrap()
    }

    /// Contract shared by every implementation
    fn check_contract(registry: &dyn PathRegistry) {
        assert!(registry.is_empty().unwrap());
        assert_eq!(registry.get(&key("demo:1")).unwrap(), None);

        registry.put(&key("demo:1"), &path("aa/demo_1")).unwrap();
        registry.put(&key("demo:1"), &path("aa/demo_1")).unwrap();
        assert_eq!(registry.len().unwrap(), 1);
        assert_eq!(
            registry.get(&key("demo:1")).unwrap(),
            Some(path("aa/demo_1"))
        );
        assert!(registry.exists(&key("demo:1")).unwrap());

        registry.put(&key("demo:1"), &path("bb/demo_1")).unwrap();
        assert_eq!(
            registry.get(&key("demo:1")).unwrap(),
            Some(path("bb/demo_1"))
        );

        registry
            .put(&key("demo:2+DC+DC.0"), &path("cc/demo_2+DC+DC.0"))
            .unwrap();
        let keys: Vec<StoreKey> = registry.keys().unwrap().collect();
        assert_eq!(keys, vec![key("demo:1"), key("demo:2+DC+DC.0")]);

        // snapshot does not follow later mutations
        let snapshot = registry.keys().unwrap();
        registry.put(&key("demo:3"), &path("demo_3")).unwrap();
        assert_eq!(snapshot.count(), 2);

        registry.remove(&key("demo:1")).unwrap();
        assert!(!registry.exists(&key("demo:1")).unwrap());
        assert!(matches!(
            registry.remove(&key("demo:1")),
            Err(RegistryError::NotFound(_))
        ));

        registry.clear().unwrap();
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn test_memory_contract() {
        check_contract(&MemoryPathRegistry::new("objectPaths"));
    }

    #[test]
    fn test_redb_contract() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RedbPathRegistry::open(dir.path().join("registry.redb"), "objectPaths").unwrap();
        check_contract(&registry);
    }

    #[test]
    fn test_redb_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("registry.redb");
        {
            let registry = RedbPathRegistry::open(&db_path, "objectPaths").unwrap();
            registry.put(&key("demo:1"), &path("aa/demo_1")).unwrap();
        }
        let registry = RedbPathRegistry::open(&db_path, "objectPaths").unwrap();
        assert_eq!(
            registry.get(&key("demo:1")).unwrap(),
            Some(path("aa/demo_1"))
        );
    }

    #[test]
    fn test_redb_tables_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(::redb::Database::create(dir.path().join("registry.redb")).unwrap());
        let objects = RedbPathRegistry::with_database(Arc::clone(&db), "objectPaths").unwrap();
        let datastreams = RedbPathRegistry::with_database(db, "datastreamPaths").unwrap();

        objects.put(&key("demo:1"), &path("demo_1")).unwrap();
        assert!(datastreams.is_empty().unwrap());
        assert_eq!(objects.name(), "objectPaths");
    }
}
