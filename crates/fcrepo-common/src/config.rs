//! Configuration types for fcrepo
//!
//! Plugin selection is by name: each `filesystem`, `pathAlgorithm` and
//! `pathRegistry` value maps onto one of the enums below, and the storage
//! crate's factory turns that into a constructor call.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Reject configurations that cannot be turned into working components
    pub fn validate(&self) -> Result<()> {
        self.storage.objects.validate("storage.objects")?;
        self.storage.datastreams.validate("storage.datastreams")?;
        if self.storage.objects.registry_name == self.storage.datastreams.registry_name
            && self.storage.objects.path_registry == PathRegistryKind::Redb
            && self.storage.objects.registry_path() == self.storage.datastreams.registry_path()
        {
            return Err(Error::configuration(
                "objects and datastreams must not share a registry table",
            ));
        }
        self.journal.validate()
    }
}

/// Low-level storage configuration: one store for objects, one for datastreams
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_object_store")]
    pub objects: StoreConfig,
    #[serde(default = "default_datastream_store")]
    pub datastreams: StoreConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            objects: default_object_store(),
            datastreams: default_datastream_store(),
        }
    }
}

fn default_object_store() -> StoreConfig {
    StoreConfig::new("./data/objects", "objectPaths")
}

fn default_datastream_store() -> StoreConfig {
    StoreConfig::new("./data/datastreams", "datastreamPaths")
}

/// Configuration of a single store
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Root directory content files live under
    pub base_dir: PathBuf,
    #[serde(default)]
    pub filesystem: FileSystemKind,
    #[serde(default)]
    pub path_algorithm: PathAlgorithmKind,
    /// Directory pattern for the hash algorithm (`#` = one hex digit)
    #[serde(default = "default_path_pattern")]
    pub path_pattern: String,
    #[serde(default)]
    pub path_registry: PathRegistryKind,
    /// Registry table name
    pub registry_name: String,
    /// Database file for persistent registries (default: `<baseDir>.redb`, beside the root)
    #[serde(default)]
    pub registry_file: Option<PathBuf>,
}

impl StoreConfig {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, registry_name: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            filesystem: FileSystemKind::default(),
            path_algorithm: PathAlgorithmKind::default(),
            path_pattern: default_path_pattern(),
            path_registry: PathRegistryKind::default(),
            registry_name: registry_name.into(),
            registry_file: None,
        }
    }

    /// Location of the persistent registry database
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.registry_file
            .clone()
            .unwrap_or_else(|| self.base_dir.with_extension("redb"))
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.registry_name.trim().is_empty() {
            return Err(Error::configuration(format!(
                "{section}.registryName must not be empty"
            )));
        }
        if self.path_algorithm == PathAlgorithmKind::Hash {
            validate_path_pattern(&self.path_pattern)
                .map_err(|e| Error::configuration(format!("{section}.pathPattern: {e}")))?;
        }
        Ok(())
    }
}

fn default_path_pattern() -> String {
    "##/##".to_string()
}

/// Check a hash directory pattern such as `##/##`
///
/// Each level must be one or more `#` characters.
pub fn validate_path_pattern(pattern: &str) -> std::result::Result<(), String> {
    if pattern.is_empty() {
        return Err("pattern is empty".into());
    }
    for level in pattern.split('/') {
        if level.is_empty() {
            return Err(format!("pattern {pattern:?} has an empty level"));
        }
        if let Some(c) = level.chars().find(|c| *c != '#') {
            return Err(format!("pattern {pattern:?} contains {c:?}"));
        }
    }
    Ok(())
}

/// Available file system implementations
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSystemKind {
    /// Files on local disk, atomic rename on write
    #[default]
    Local,
    /// Process-local memory, for tests and scratch nodes
    Memory,
}

/// Available path algorithms
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathAlgorithmKind {
    /// Hashed directory fan-out
    #[default]
    Hash,
    /// Every file directly under the base directory
    Flat,
}

/// Available path registries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathRegistryKind {
    /// Persistent redb table
    #[default]
    Redb,
    /// In-memory map, lost on restart
    Memory,
}

/// Journal configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalConfig {
    /// Whether management operations are journaled at all
    #[serde(default)]
    pub enabled: bool,
    /// Identifies the repository a journal file came from
    #[serde(default = "default_repository_hash")]
    pub repository_hash: String,
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
    /// Rotate after this many entries (0 = no limit)
    #[serde(default = "default_max_entries")]
    pub max_entries_per_file: u64,
    /// Rotate after a file has been open this long (0 = no limit)
    #[serde(default = "default_max_age")]
    pub max_file_age_secs: u64,
    /// Where per-transport acknowledgments are recorded
    #[serde(default)]
    pub ack_log: Option<PathBuf>,
    #[serde(default)]
    pub transports: Vec<TransportConfig>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repository_hash: default_repository_hash(),
            filename_prefix: default_filename_prefix(),
            max_entries_per_file: default_max_entries(),
            max_file_age_secs: default_max_age(),
            ack_log: None,
            transports: Vec::new(),
        }
    }
}

impl JournalConfig {
    fn validate(&self) -> Result<()> {
        if self.enabled && self.transports.is_empty() {
            return Err(Error::configuration(
                "journal is enabled but no transports are configured",
            ));
        }
        if self.filename_prefix.is_empty() || self.filename_prefix.contains('/') {
            return Err(Error::configuration(format!(
                "invalid journal filename prefix {:?}",
                self.filename_prefix
            )));
        }
        let mut names = HashSet::new();
        for transport in &self.transports {
            if !names.insert(transport.name()) {
                return Err(Error::configuration(format!(
                    "duplicate transport name {:?}",
                    transport.name()
                )));
            }
        }
        Ok(())
    }
}

fn default_repository_hash() -> String {
    "fcrepo".to_string()
}

fn default_filename_prefix() -> String {
    "fedoraJournal".to_string()
}

const fn default_max_entries() -> u64 {
    10_000
}

const fn default_max_age() -> u64 {
    24 * 60 * 60
}

/// One journal destination
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Journal files written to a local directory
    Local { name: String, directory: PathBuf },
    /// Journal files streamed to a remote receiver
    Remote {
        name: String,
        address: SocketAddr,
        #[serde(default = "default_remote_timeout")]
        timeout_secs: u64,
    },
}

impl TransportConfig {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Local { name, .. } | Self::Remote { name, .. } => name,
        }
    }
}

const fn default_remote_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.storage.objects.registry_name, "objectPaths");
        assert_eq!(config.storage.datastreams.registry_name, "datastreamPaths");
        assert_eq!(config.storage.objects.path_algorithm, PathAlgorithmKind::Hash);
    }

    #[test]
    fn test_parse_full_config() {
        let text = r###"
            [storage.objects]
            baseDir = "/srv/fedora/objects"
            filesystem = "local"
            pathAlgorithm = "hash"
            pathPattern = "##/###"
            pathRegistry = "redb"
            registryName = "objectPaths"

            [storage.datastreams]
            baseDir = "/srv/fedora/datastreams"
            pathAlgorithm = "flat"
            pathRegistry = "memory"
            registryName = "datastreamPaths"

            [journal]
            enabled = true
            repositoryHash = "abc123"
            maxEntriesPerFile = 50

            [[journal.transports]]
            kind = "local"
            name = "primary"
            directory = "/srv/fedora/journal"

            [[journal.transports]]
            kind = "remote"
            name = "replica"
            address = "10.0.0.2:7070"

            [logging]
            level = "debug"
        "###;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.storage.objects.path_pattern, "##/###");
        assert_eq!(
            config.storage.datastreams.path_registry,
            PathRegistryKind::Memory
        );
        assert_eq!(config.journal.transports.len(), 2);
        assert_eq!(config.journal.transports[1].name(), "replica");
        assert_eq!(config.journal.max_entries_per_file, 50);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_reject_bad_pattern() {
        let mut config = Config::default();
        config.storage.objects.path_pattern = "##//##".into();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
        config.storage.objects.path_pattern = "#x".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_duplicate_transports() {
        let mut config = Config::default();
        config.journal.enabled = true;
        config.journal.transports = vec![
            TransportConfig::Local {
                name: "a".into(),
                directory: "/tmp/a".into(),
            },
            TransportConfig::Local {
                name: "a".into(),
                directory: "/tmp/b".into(),
            },
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reject_enabled_journal_without_transports() {
        let mut config = Config::default();
        config.journal.enabled = true;
        assert!(config.validate().is_err());
    }
}
