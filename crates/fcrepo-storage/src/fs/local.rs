//! Local disk file system
//!
//! Content is staged in a temp file next to its target, synced, and
//! renamed into place. `write` uses a no-clobber rename so two writers can
//! never both create the same file.

use super::{FileSystem, STAGING_PREFIX};
use crate::error::{FsError, FsResult};
use crate::path::StoredPath;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Attempts at creating a staging file when a concurrent delete prunes its
/// directory out from under us
const STAGE_ATTEMPTS: usize = 3;

/// File system rooted at a local directory
#[derive(Debug)]
pub struct LocalFileSystem {
    root: PathBuf,
}

impl LocalFileSystem {
    /// Open (creating if needed) a file system rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> FsResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| FsError::io(&root, e))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copy `content` into a synced staging file in `target`'s directory
    fn stage(&self, target: &Path, content: &mut dyn Read) -> FsResult<(NamedTempFile, u64)> {
        let parent = target.parent().unwrap_or(&self.root);

        let mut attempt = 0;
        let mut staged = loop {
            attempt += 1;
            fs::create_dir_all(parent).map_err(|e| FsError::io(parent, e))?;
            match tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempfile_in(parent)
            {
                Ok(file) => break file,
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < STAGE_ATTEMPTS => {
                    debug!("staging directory {:?} vanished, retrying", parent);
                }
                Err(e) => return Err(FsError::io(parent, e)),
            }
        };

        let written =
            io::copy(content, staged.as_file_mut()).map_err(|e| FsError::io(staged.path(), e))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|e| FsError::io(staged.path(), e))?;

        Ok((staged, written))
    }

    /// Remove directories emptied by a delete, stopping at the root
    fn prune_empty_dirs(&self, start: Option<&Path>) {
        let mut dir = start;
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    fn walk_dir(&self, dir: &Path, out: &mut Vec<StoredPath>) -> FsResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(FsError::io(dir, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| FsError::io(dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| FsError::io(&path, e))?;

            if file_type.is_dir() {
                self.walk_dir(&path, out)?;
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                continue;
            }

            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let components: Option<Vec<&str>> = relative
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect();
            match components.map(|c| StoredPath::new(c.join("/"))) {
                Some(Ok(stored)) => out.push(stored),
                _ => warn!("skipping unrepresentable file {:?}", path),
            }
        }
        Ok(())
    }
}

fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!("directory sync of {:?} failed: {}", dir, e);
    }
}

impl FileSystem for LocalFileSystem {
    fn name(&self) -> &'static str {
        "local"
    }

    fn write(&self, path: &StoredPath, content: &mut dyn Read) -> FsResult<u64> {
        let target = path.to_path(&self.root);
        if target.exists() {
            return Err(FsError::AlreadyExists(path.clone()));
        }

        let (staged, written) = self.stage(&target, content)?;
        staged.persist_noclobber(&target).map_err(|e| {
            if e.error.kind() == io::ErrorKind::AlreadyExists {
                FsError::AlreadyExists(path.clone())
            } else {
                FsError::io(&target, e.error)
            }
        })?;

        if let Some(parent) = target.parent() {
            sync_dir(parent);
        }
        Ok(written)
    }

    fn rewrite(&self, path: &StoredPath, content: &mut dyn Read) -> FsResult<u64> {
        let target = path.to_path(&self.root);
        if !target.is_file() {
            return Err(FsError::NotFound(path.clone()));
        }

        let (staged, written) = self.stage(&target, content)?;
        staged
            .persist(&target)
            .map_err(|e| FsError::io(&target, e.error))?;

        if let Some(parent) = target.parent() {
            sync_dir(parent);
        }
        Ok(written)
    }

    fn read(&self, path: &StoredPath) -> FsResult<Box<dyn Read + Send>> {
        let target = path.to_path(&self.root);
        match File::open(&target) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FsError::NotFound(path.clone())),
            Err(e) => Err(FsError::io(target, e)),
        }
    }

    fn delete(&self, path: &StoredPath) -> FsResult<()> {
        let target = path.to_path(&self.root);
        match fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FsError::NotFound(path.clone()));
            }
            Err(e) => return Err(FsError::io(target, e)),
        }
        self.prune_empty_dirs(target.parent());
        Ok(())
    }

    fn exists(&self, path: &StoredPath) -> FsResult<bool> {
        let target = path.to_path(&self.root);
        match fs::metadata(&target) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::io(target, e)),
        }
    }

    fn size(&self, path: &StoredPath) -> FsResult<u64> {
        let target = path.to_path(&self.root);
        match fs::metadata(&target) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(FsError::NotFound(path.clone())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(FsError::NotFound(path.clone())),
            Err(e) => Err(FsError::io(target, e)),
        }
    }

    fn walk(&self) -> FsResult<Vec<StoredPath>> {
        let mut out = Vec::new();
        self.walk_dir(&self.root, &mut out)?;
        out.sort();
        Ok(out)
    }
}
