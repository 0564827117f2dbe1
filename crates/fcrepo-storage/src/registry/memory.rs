//! In-memory path registry

use super::PathRegistry;
use crate::error::{RegistryError, RegistryResult};
use crate::path::StoredPath;
use fcrepo_common::StoreKey;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Registry held in a sorted map; contents are lost on restart
#[derive(Debug)]
pub struct MemoryPathRegistry {
    name: String,
    entries: RwLock<BTreeMap<StoreKey, StoredPath>>,
}

impl MemoryPathRegistry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl PathRegistry for MemoryPathRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    fn put(&self, key: &StoreKey, path: &StoredPath) -> RegistryResult<()> {
        self.entries.write().insert(key.clone(), path.clone());
        Ok(())
    }

    fn get(&self, key: &StoreKey) -> RegistryResult<Option<StoredPath>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn remove(&self, key: &StoreKey) -> RegistryResult<()> {
        self.entries
            .write()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(key.clone()))
    }

    fn entries(&self) -> RegistryResult<Vec<(StoreKey, StoredPath)>> {
        Ok(self
            .entries
            .read()
            .iter()
            .map(|(k, p)| (k.clone(), p.clone()))
            .collect())
    }

    fn len(&self) -> RegistryResult<usize> {
        Ok(self.entries.read().len())
    }

    fn clear(&self) -> RegistryResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}
