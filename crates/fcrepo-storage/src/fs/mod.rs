//! File system abstraction
//!
//! The store only ever talks to a `FileSystem`. Implementations must make
//! `write` and `rewrite` atomic with respect to readers: a reader sees the
//! complete old content or the complete new content, never a mix.

mod local;
mod memory;

pub use local::LocalFileSystem;
pub use memory::MemoryFileSystem;

use crate::error::FsResult;
use crate::path::StoredPath;
use std::io::Read;

/// Prefix of the files content is staged in before it is renamed into
/// place. `walk` never reports them.
///
/// Key file names start with a namespace character, and namespaces never
/// contain `_`, so no stored file can carry this prefix.
pub const STAGING_PREFIX: &str = "_stage-";

/// Raw file primitives used by the store
pub trait FileSystem: Send + Sync {
    /// Short name used in logs and configuration
    fn name(&self) -> &'static str;

    /// Create `path` with `content`; fails with `AlreadyExists` if present
    fn write(&self, path: &StoredPath, content: &mut dyn Read) -> FsResult<u64>;

    /// Replace the content of an existing file; fails with `NotFound` if absent
    fn rewrite(&self, path: &StoredPath, content: &mut dyn Read) -> FsResult<u64>;

    /// Open a file for reading
    fn read(&self, path: &StoredPath) -> FsResult<Box<dyn Read + Send>>;

    /// Delete a file; fails with `NotFound` if absent
    fn delete(&self, path: &StoredPath) -> FsResult<()>;

    fn exists(&self, path: &StoredPath) -> FsResult<bool>;

    /// Size of a file in bytes
    fn size(&self, path: &StoredPath) -> FsResult<u64>;

    /// Every stored file, sorted
    fn walk(&self) -> FsResult<Vec<StoredPath>>;
}
