//! Cached parsed documents
//!
//! A `CachedDocument` owns the parsed form of a file together with the
//! version of the source it was parsed from and the time the source was last
//! checked. All three live behind one mutex and are replaced together.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};

type Parser<T> = Box<dyn Fn(&[u8]) -> Result<T> + Send + Sync>;

/// Identifies one revision of a source file
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceVersion {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl SourceVersion {
    fn of(path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

struct Entry<T> {
    content: Arc<T>,
    version: SourceVersion,
    last_checked: Instant,
}

/// A file parsed on first use and re-parsed when it changes on disk
pub struct CachedDocument<T> {
    path: PathBuf,
    check_interval: Duration,
    parse: Parser<T>,
    entry: Mutex<Option<Entry<T>>>,
}

impl<T> CachedDocument<T> {
    /// Create a cache for `path`; the source is stat'ed at most once per `check_interval`
    pub fn new<F>(path: impl Into<PathBuf>, check_interval: Duration, parse: F) -> Self
    where
        F: Fn(&[u8]) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            check_interval,
            parse: Box::new(parse),
            entry: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current parsed content, reloading if the source changed
    ///
    /// A source that fails to parse is reported as an error; the previously
    /// cached content is kept so a later call can still succeed once the file
    /// is fixed.
    pub fn get(&self) -> Result<Arc<T>> {
        let mut guard = self.entry.lock();

        if let Some(entry) = guard.as_mut() {
            if entry.last_checked.elapsed() < self.check_interval {
                return Ok(Arc::clone(&entry.content));
            }
            let version = SourceVersion::of(&self.path)?;
            if version == entry.version {
                entry.last_checked = Instant::now();
                return Ok(Arc::clone(&entry.content));
            }
            debug!("{:?} changed, reloading", self.path);
        }

        let version = SourceVersion::of(&self.path)?;
        let bytes = std::fs::read(&self.path)?;
        let content = match (self.parse)(&bytes) {
            Ok(content) => Arc::new(content),
            Err(e) => {
                warn!("failed to parse {:?}: {}", self.path, e);
                return Err(e);
            }
        };

        *guard = Some(Entry {
            content: Arc::clone(&content),
            version,
            last_checked: Instant::now(),
        });
        Ok(content)
    }

    /// Version of the source the cached content was parsed from
    #[must_use]
    pub fn cached_version(&self) -> Option<SourceVersion> {
        self.entry.lock().as_ref().map(|e| e.version)
    }

    /// Drop the cached content so the next `get` re-reads the source
    pub fn invalidate(&self) {
        *self.entry.lock() = None;
    }
}

impl CachedDocument<crate::config::Config> {
    /// Cache a TOML configuration file
    pub fn config(path: impl Into<PathBuf>, check_interval: Duration) -> Self {
        Self::new(path, check_interval, |bytes| {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| Error::Deserialization(format!("config is not UTF-8: {e}")))?;
            crate::config::Config::from_toml_str(text)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_cache(path: &Path, interval: Duration) -> (CachedDocument<String>, Arc<AtomicUsize>) {
        let parses = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&parses);
        let cache = CachedDocument::new(path, interval, move |bytes| {
            counter.fetch_add(1, Ordering::SeqCst);
            String::from_utf8(bytes.to_vec()).map_err(|e| Error::Deserialization(e.to_string()))
        });
        (cache, parses)
    }

    #[test]
    fn test_parses_once_while_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "one").unwrap();

        let (cache, parses) = counting_cache(&path, Duration::ZERO);
        assert_eq!(*cache.get().unwrap(), "one");
        assert_eq!(*cache.get().unwrap(), "one");
        assert_eq!(parses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reloads_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "one").unwrap();

        let (cache, parses) = counting_cache(&path, Duration::ZERO);
        assert_eq!(*cache.get().unwrap(), "one");

        std::fs::write(&path, "three").unwrap();
        assert_eq!(*cache.get().unwrap(), "three");
        assert_eq!(parses.load(Ordering::SeqCst), 2);
        assert_eq!(cache.cached_version().unwrap().len, 5);
    }

    #[test]
    fn test_check_interval_suppresses_stat() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "one").unwrap();

        let (cache, _) = counting_cache(&path, Duration::from_secs(3600));
        assert_eq!(*cache.get().unwrap(), "one");
        std::fs::write(&path, "changed").unwrap();
        assert_eq!(*cache.get().unwrap(), "one");

        cache.invalidate();
        assert_eq!(*cache.get().unwrap(), "changed");
    }

    #[test]
    fn test_parse_failure_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fcrepo.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let cache = CachedDocument::config(&path, Duration::ZERO);
        assert_eq!(cache.get().unwrap().logging.level, "debug");

        std::fs::write(&path, "[logging\n").unwrap();
        assert!(cache.get().is_err());
        assert!(cache.cached_version().is_some());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (cache, _) = counting_cache(&dir.path().join("absent"), Duration::ZERO);
        assert!(matches!(cache.get(), Err(Error::Io(_))));
    }
}
