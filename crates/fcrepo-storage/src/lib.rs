//! fcrepo Storage - Low-level content storage
//!
//! This crate implements keyed content storage for digital objects:
//! - Path algorithms mapping store keys to relative file paths
//! - Path registries (in-memory and redb) recording where each key lives
//! - File systems (local disk with atomic rename, and in-memory)
//! - `Store`, combining the three, with audit and registry rebuild
//! - `LowlevelStorage`, the object and datastream store pair

pub mod error;
pub mod factory;
pub mod fs;
pub mod lowlevel;
pub mod path;
pub mod registry;
pub mod store;

// Re-exports
pub use error::{FsError, PathError, RegistryError, StoreError, StoreResult};
pub use factory::StoreFactory;
pub use fs::{FileSystem, LocalFileSystem, MemoryFileSystem};
pub use lowlevel::{LowlevelStorage, StorageAudit};
pub use path::{FlatPathAlgorithm, HashPathAlgorithm, PathAlgorithm, StoredPath};
pub use registry::{MemoryPathRegistry, PathRegistry, RedbPathRegistry};
pub use store::{AuditReport, Discrepancy, RebuildReport, Store};
