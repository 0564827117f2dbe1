//! Path algorithms
//!
//! A path algorithm maps a store key to the relative location of its file.
//! The mapping must be a pure function of the key: a registry built under
//! one algorithm is only meaningful while that algorithm stays in place.

use crate::error::PathError;
use fcrepo_common::StoreKey;
use fcrepo_common::config::validate_path_pattern;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Number of hex digits a SHA-256 digest provides to a pattern
const HEX_DIGITS: usize = 64;

/// Relative, `/`-separated location of a stored file
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoredPath(String);

impl StoredPath {
    /// Validate a relative path
    ///
    /// Rejects absolute paths, empty components and `.`/`..` components.
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        let invalid = |reason: &str| PathError::InvalidPath {
            path: path.clone(),
            reason: reason.to_string(),
        };

        if path.is_empty() {
            return Err(invalid("empty"));
        }
        if path.starts_with('/') {
            return Err(invalid("absolute"));
        }
        if path.contains('\\') {
            return Err(invalid("contains a backslash"));
        }
        for component in path.split('/') {
            if component.is_empty() {
                return Err(invalid("empty component"));
            }
            if component == "." || component == ".." {
                return Err(invalid("relative component"));
            }
        }
        Ok(Self(path))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last component
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Resolve against a root directory
    #[must_use]
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |p, c| p.join(c))
    }
}

impl fmt::Display for StoredPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StoredPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoredPath({:?})", self.0)
    }
}

/// Maps store keys to relative file paths
pub trait PathAlgorithm: Send + Sync {
    /// Short name used in logs and configuration
    fn name(&self) -> &'static str;

    /// Deterministic path for `key`
    fn path_for(&self, key: &StoreKey) -> Result<StoredPath, PathError>;
}

/// Fans files out over directories named by a digest of the key
///
/// The pattern `##/##` puts `demo:1` at `ab/cd/demo_1` where `abcd` are the
/// first four hex digits of the SHA-256 of `demo:1`.
#[derive(Clone, Debug)]
pub struct HashPathAlgorithm {
    levels: Vec<usize>,
}

impl HashPathAlgorithm {
    pub fn new(pattern: &str) -> Result<Self, PathError> {
        validate_path_pattern(pattern).map_err(PathError::InvalidPattern)?;
        let levels: Vec<usize> = pattern.split('/').map(str::len).collect();
        let total: usize = levels.iter().sum();
        if total > HEX_DIGITS {
            return Err(PathError::InvalidPattern(format!(
                "pattern {pattern:?} needs {total} hex digits, digest has {HEX_DIGITS}"
            )));
        }
        Ok(Self { levels })
    }

    /// Number of directory levels above each file
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

impl Default for HashPathAlgorithm {
    fn default() -> Self {
        Self {
            levels: vec![2, 2],
        }
    }
}

impl PathAlgorithm for HashPathAlgorithm {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn path_for(&self, key: &StoreKey) -> Result<StoredPath, PathError> {
        let digest = hex::encode(Sha256::digest(key.to_string().as_bytes()));

        let mut path = String::with_capacity(digest.len() + 32);
        let mut offset = 0;
        for width in &self.levels {
            path.push_str(&digest[offset..offset + width]);
            path.push('/');
            offset += width;
        }
        path.push_str(&key.to_filename());

        StoredPath::new(path).map_err(|_| PathError::Empty(key.to_string()))
    }
}

/// Puts every file directly under the store root
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatPathAlgorithm;

impl PathAlgorithm for FlatPathAlgorithm {
    fn name(&self) -> &'static str {
        "flat"
    }

    fn path_for(&self, key: &StoreKey) -> Result<StoredPath, PathError> {
        StoredPath::new(key.to_filename()).map_err(|_| PathError::Empty(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> StoreKey {
        StoreKey::parse(s).unwrap()
    }

    #[test]
    fn test_stored_path_validation() {
        assert!(StoredPath::new("ab/cd/demo_1").is_ok());
        assert!(StoredPath::new("").is_err());
        assert!(StoredPath::new("/abs").is_err());
        assert!(StoredPath::new("a//b").is_err());
        assert!(StoredPath::new("a/../b").is_err());
        assert!(StoredPath::new("a/").is_err());
        assert_eq!(StoredPath::new("ab/cd/demo_1").unwrap().file_name(), "demo_1");
    }

    #[test]
    fn test_hash_path_is_deterministic() {
        let algorithm = HashPathAlgorithm::new("##/##").unwrap();
        let a = algorithm.path_for(&key("demo:1")).unwrap();
        let b = HashPathAlgorithm::new("##/##")
            .unwrap()
            .path_for(&key("demo:1"))
            .unwrap();
        assert_eq!(a, b);

        let parts: Vec<&str> = a.as_str().split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 2);
        assert_eq!(parts[1].len(), 2);
        assert_eq!(parts[2], "demo_1");

        let digest = hex::encode(Sha256::digest(b"demo:1"));
        assert_eq!(format!("{}{}", parts[0], parts[1]), &digest[..4]);
    }

    #[test]
    fn test_hash_path_uses_normalized_key() {
        let algorithm = HashPathAlgorithm::default();
        let a = algorithm.path_for(&key("demo:a%2f")).unwrap();
        let b = algorithm.path_for(&key("info:fedora/demo:a%2F")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_path_datastream() {
        let algorithm = HashPathAlgorithm::new("###").unwrap();
        let path = algorithm.path_for(&key("demo:1+DC+DC.0")).unwrap();
        assert_eq!(path.file_name(), "demo_1+DC+DC.0");
        assert_eq!(
            StoreKey::from_filename(path.file_name()).unwrap(),
            key("demo:1+DC+DC.0")
        );
    }

    #[test]
    fn test_hash_pattern_rejected() {
        assert!(HashPathAlgorithm::new("").is_err());
        assert!(HashPathAlgorithm::new("##/").is_err());
        assert!(HashPathAlgorithm::new("#a").is_err());
        assert!(HashPathAlgorithm::new(&"#".repeat(65)).is_err());
        assert!(HashPathAlgorithm::new(&"#".repeat(64)).is_ok());
    }

    #[test]
    fn test_flat_path() {
        let path = FlatPathAlgorithm.path_for(&key("demo:1")).unwrap();
        assert_eq!(path.as_str(), "demo_1");
    }
}
