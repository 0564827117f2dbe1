//! Path registry backed by a redb table
//!
//! One table per registry name. Several registries may share a database
//! through [`RedbPathRegistry::with_database`]; every write is its own
//! committed transaction.

use super::PathRegistry;
use crate::error::{RegistryError, RegistryResult};
use crate::path::StoredPath;
use fcrepo_common::StoreKey;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Persistent registry stored in a redb table
pub struct RedbPathRegistry {
    db: Arc<Database>,
    table: String,
}

impl RedbPathRegistry {
    /// Open (or create) the database at `path` and the table `name` in it
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>) -> RegistryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;
        Self::with_database(Arc::new(db), name)
    }

    /// Use table `name` in an already open database
    pub fn with_database(db: Arc<Database>, name: impl Into<String>) -> RegistryResult<Self> {
        let registry = Self {
            db,
            table: name.into(),
        };

        // Create the table eagerly so later read txns don't fail
        let write_txn = registry.db.begin_write()?;
        {
            let _t = write_txn.open_table(registry.definition())?;
        }
        write_txn.commit()?;

        debug!("opened redb path registry {:?}", registry.table);
        Ok(registry)
    }

    fn definition(&self) -> TableDefinition<'_, &'static str, &'static str> {
        TableDefinition::new(&self.table)
    }
}

fn parse_entry(key: &str, path: &str) -> RegistryResult<(StoreKey, StoredPath)> {
    let store_key = StoreKey::parse(key).map_err(|e| RegistryError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    let stored = StoredPath::new(path).map_err(|e| RegistryError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    Ok((store_key, stored))
}

impl PathRegistry for RedbPathRegistry {
    fn name(&self) -> &str {
        &self.table
    }

    fn put(&self, key: &StoreKey, path: &StoredPath) -> RegistryResult<()> {
        let key = key.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(self.definition())?;
            table.insert(key.as_str(), path.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get(&self, key: &StoreKey) -> RegistryResult<Option<StoredPath>> {
        let key = key.to_string();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.definition())?;
        match table.get(key.as_str())? {
            Some(value) => parse_entry(&key, value.value()).map(|(_, path)| Some(path)),
            None => Ok(None),
        }
    }

    fn remove(&self, key: &StoreKey) -> RegistryResult<()> {
        let key_str = key.to_string();
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(self.definition())?;
            let removed = table.remove(key_str.as_str())?.is_some();
            removed
        };
        if removed {
            write_txn.commit()?;
            Ok(())
        } else {
            write_txn.abort()?;
            Err(RegistryError::NotFound(key.clone()))
        }
    }

    fn entries(&self) -> RegistryResult<Vec<(StoreKey, StoredPath)>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.definition())?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (key, path) = entry?;
            result.push(parse_entry(key.value(), path.value())?);
        }
        result.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(result)
    }

    fn len(&self) -> RegistryResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(self.definition())?;
        let len = table.len()?;
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }

    fn clear(&self) -> RegistryResult<()> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(self.definition())?;
        {
            let _t = write_txn.open_table(self.definition())?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
