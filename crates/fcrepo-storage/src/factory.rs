//! Build stores from configuration
//!
//! Registries configured with the same database file share one open redb
//! `Database`, since redb allows a single handle per file per process.

use crate::error::{StoreError, StoreResult};
use crate::fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
use crate::path::{FlatPathAlgorithm, HashPathAlgorithm, PathAlgorithm};
use crate::registry::{MemoryPathRegistry, PathRegistry, RedbPathRegistry};
use crate::store::Store;
use fcrepo_common::config::{
    FileSystemKind, PathAlgorithmKind, PathRegistryKind, StoreConfig,
};
use redb::Database;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Builds stores, sharing redb handles between them
#[derive(Default)]
pub struct StoreFactory {
    databases: HashMap<PathBuf, Arc<Database>>,
}

impl StoreFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, config: &StoreConfig) -> StoreResult<Store> {
        let algorithm = Self::algorithm(config)?;
        let fs = Self::filesystem(config)?;
        let registry = self.registry(config)?;

        info!(
            "store {}: {} paths, {} registry, {} file system at {:?}",
            config.registry_name,
            algorithm.name(),
            match config.path_registry {
                PathRegistryKind::Redb => "redb",
                PathRegistryKind::Memory => "memory",
            },
            fs.name(),
            config.base_dir
        );
        Ok(Store::new(algorithm, registry, fs))
    }

    fn algorithm(config: &StoreConfig) -> StoreResult<Arc<dyn PathAlgorithm>> {
        Ok(match config.path_algorithm {
            PathAlgorithmKind::Hash => Arc::new(
                HashPathAlgorithm::new(&config.path_pattern)
                    .map_err(|e| StoreError::Configuration(e.to_string()))?,
            ),
            PathAlgorithmKind::Flat => Arc::new(FlatPathAlgorithm),
        })
    }

    fn filesystem(config: &StoreConfig) -> StoreResult<Arc<dyn FileSystem>> {
        Ok(match config.filesystem {
            FileSystemKind::Local => Arc::new(
                LocalFileSystem::new(&config.base_dir)
                    .map_err(|e| StoreError::Configuration(e.to_string()))?,
            ),
            FileSystemKind::Memory => Arc::new(MemoryFileSystem::new()),
        })
    }

    fn registry(&mut self, config: &StoreConfig) -> StoreResult<Arc<dyn PathRegistry>> {
        match config.path_registry {
            PathRegistryKind::Memory => {
                Ok(Arc::new(MemoryPathRegistry::new(&config.registry_name)))
            }
            PathRegistryKind::Redb => {
                let db = self.database(config.registry_path())?;
                let registry = RedbPathRegistry::with_database(db, &config.registry_name)
                    .map_err(|e| StoreError::Configuration(e.to_string()))?;
                Ok(Arc::new(registry))
            }
        }
    }

    fn database(&mut self, path: PathBuf) -> StoreResult<Arc<Database>> {
        if let Some(db) = self.databases.get(&path) {
            return Ok(Arc::clone(db));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Configuration(format!("{}: {e}", parent.display()))
            })?;
        }
        let db = Database::create(&path)
            .map_err(|e| StoreError::Configuration(format!("{}: {e}", path.display())))?;
        let db = Arc::new(db);
        self.databases.insert(path, Arc::clone(&db));
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fcrepo_common::StoreKey;
    use std::io::Cursor;

    #[test]
    fn test_build_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("objects"), "objectPaths");

        let mut factory = StoreFactory::new();
        let store = factory.build(&config).unwrap();
        let key = StoreKey::parse("demo:1").unwrap();
        store.add(&key, Cursor::new(b"hello")).unwrap();

        assert!(dir.path().join("objects.redb").exists());
        assert_eq!(store.name(), "objectPaths");
    }

    #[test]
    fn test_shared_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let shared = dir.path().join("registry.redb");

        let mut objects = StoreConfig::new(dir.path().join("objects"), "objectPaths");
        objects.registry_file = Some(shared.clone());
        let mut datastreams = StoreConfig::new(dir.path().join("datastreams"), "datastreamPaths");
        datastreams.registry_file = Some(shared);

        let mut factory = StoreFactory::new();
        let objects = factory.build(&objects).unwrap();
        let datastreams = factory.build(&datastreams).unwrap();

        let key = StoreKey::parse("demo:1").unwrap();
        objects.add(&key, Cursor::new(b"obj")).unwrap();
        assert!(!datastreams.exists(&key).unwrap());
    }

    #[test]
    fn test_bad_pattern_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StoreConfig::new(dir.path().join("objects"), "objectPaths");
        config.path_pattern = "#x#".into();
        config.path_registry = PathRegistryKind::Memory;

        let err = StoreFactory::new().build(&config).unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }
}
