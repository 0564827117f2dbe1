//! In-memory file system
//!
//! Each file is an immutable `Bytes` value; writes swap the whole value
//! under the lock, so readers holding the previous value are unaffected.

use super::FileSystem;
use crate::error::{FsError, FsResult};
use crate::path::StoredPath;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// File system kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<BTreeMap<StoredPath, Bytes>>,
}

impl MemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slurp(path: &StoredPath, content: &mut dyn Read) -> FsResult<Bytes> {
        let mut buf = Vec::new();
        content
            .read_to_end(&mut buf)
            .map_err(|e| FsError::io(path.as_str(), e))?;
        Ok(Bytes::from(buf))
    }
}

impl FileSystem for MemoryFileSystem {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn write(&self, path: &StoredPath, content: &mut dyn Read) -> FsResult<u64> {
        if self.files.read().contains_key(path) {
            return Err(FsError::AlreadyExists(path.clone()));
        }
        let data = Self::slurp(path, content)?;
        let len = data.len() as u64;

        let mut files = self.files.write();
        if files.contains_key(path) {
            return Err(FsError::AlreadyExists(path.clone()));
        }
        files.insert(path.clone(), data);
        Ok(len)
    }

    fn rewrite(&self, path: &StoredPath, content: &mut dyn Read) -> FsResult<u64> {
        if !self.files.read().contains_key(path) {
            return Err(FsError::NotFound(path.clone()));
        }
        let data = Self::slurp(path, content)?;
        let len = data.len() as u64;

        let mut files = self.files.write();
        match files.get_mut(path) {
            Some(existing) => *existing = data,
            None => return Err(FsError::NotFound(path.clone())),
        }
        Ok(len)
    }

    fn read(&self, path: &StoredPath) -> FsResult<Box<dyn Read + Send>> {
        self.files
            .read()
            .get(path)
            .map(|data| Box::new(Cursor::new(data.clone())) as Box<dyn Read + Send>)
            .ok_or_else(|| FsError::NotFound(path.clone()))
    }

    fn delete(&self, path: &StoredPath) -> FsResult<()> {
        self.files
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(path.clone()))
    }

    fn exists(&self, path: &StoredPath) -> FsResult<bool> {
        Ok(self.files.read().contains_key(path))
    }

    fn size(&self, path: &StoredPath) -> FsResult<u64> {
        self.files
            .read()
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| FsError::NotFound(path.clone()))
    }

    fn walk(&self) -> FsResult<Vec<StoredPath>> {
        Ok(self.files.read().keys().cloned().collect())
    }
}
