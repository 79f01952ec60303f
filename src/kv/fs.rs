//! Directory-backed KV store implementation.
//!
//! Each key is a relative path under the root directory. Writes go to a
//! temporary file in the destination directory and are renamed into place,
//! so a crash mid-write leaves at most an orphaned `.partial-*` file that
//! no read, existence check or listing will ever report.

use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::KvStore;
use crate::{Error, Result};

/// Name prefix of in-flight temporary files.
const PARTIAL_PREFIX: &str = ".partial-";

/// Filesystem key-value store rooted at a directory.
///
/// # Example
///
/// ```rust
/// use anomaly_sweep::kv::{FsKvStore, KvStore};
///
/// # fn example() -> anomaly_sweep::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let store = FsKvStore::open(dir.path())?;
/// store.set("ae/mnist/seed_1/lr=0.001.json", b"{}".to_vec())?;
/// assert!(dir.path().join("ae/mnist/seed_1/lr=0.001.json").is_file());
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct FsKvStore {
    root: PathBuf,
}

impl FsKvStore {
    /// Open (and create if needed) a store rooted at `root`.
    ///
    /// # Errors
    /// Returns error if the root directory cannot be created.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Delete temporary files orphaned by interrupted writes.
    ///
    /// Only partials whose last modification is at least `older_than` ago
    /// are removed. A live commit holds its partial for the time it takes
    /// to write and sync one record, so with an age well above that this is
    /// safe to run while other workers commit into the same root. A partial
    /// that vanishes during the scan was renamed or cleaned by someone else
    /// and is skipped.
    ///
    /// # Errors
    /// Returns error if the directory tree cannot be scanned or a file
    /// cannot be removed.
    pub fn remove_partials(&self, older_than: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| Error::Storage(format!("scan failed: {e}")))?;
            if !entry.file_type().is_file() || !is_partial(entry.path()) {
                continue;
            }
            let modified = match entry.metadata().map(|m| m.modified()) {
                Ok(Ok(modified)) => modified,
                Ok(Err(e)) => return Err(e.into()),
                Err(e) if e.io_error().is_some_and(|e| e.kind() == io::ErrorKind::NotFound) => {
                    continue;
                }
                Err(e) => return Err(Error::Storage(format!("scan failed: {e}"))),
            };
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if age < older_than {
                debug!(path = %entry.path().display(), ?age, "keeping recent partial");
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            warn!(removed, root = %self.root.display(), "removed partial writes");
        }
        Ok(removed)
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && !key.contains('\\')
            && !key.contains('\0')
            && key
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != "..")
            && relative.components().all(|c| match c {
                Component::Normal(part) => !part
                    .to_str()
                    .is_some_and(|p| p.starts_with(PARTIAL_PREFIX)),
                _ => false,
            });
        if valid {
            Ok(self.root.join(relative))
        } else {
            Err(Error::InvalidKey(format!(
                "'{key}' is not a relative path of normal components"
            )))
        }
    }
}

/// Write `bytes` to `path` through a same-directory temp file and rename.
///
/// `before_persist` runs after the temp file is fully written and synced
/// but before the rename; an error from it aborts the commit and the temp
/// file is removed.
pub(crate) fn write_atomic<F>(path: &Path, bytes: &[u8], before_persist: F) -> Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    before_persist(tmp.path())?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    debug!(path = %path.display(), bytes = bytes.len(), "committed");
    Ok(())
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(PARTIAL_PREFIX))
}

impl KvStore for FsKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        write_atomic(&path, &value, |_| Ok(()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key)?.is_file())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| Error::Storage(format!("scan failed: {e}")))?;
            if !entry.file_type().is_file() || is_partial(entry.path()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let parts: Option<Vec<&str>> = relative
                .components()
                .map(|c| c.as_os_str().to_str())
                .collect();
            let Some(parts) = parts else {
                continue;
            };
            let key = parts.join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsKvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKvStore::open(dir.path().join("results")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_root() {
        let (dir, store) = store();
        assert!(dir.path().join("results").is_dir());
        assert_eq!(store.root(), dir.path().join("results"));
    }

    #[test]
    fn test_interrupted_write_is_invisible() {
        let (_dir, store) = store();
        let path = store.path_for("m/d/seed_1/a.json").unwrap();

        let result = write_atomic(&path, b"{\"complete\": true}", |tmp| {
            assert!(tmp.is_file());
            Err(io::Error::new(io::ErrorKind::Other, "injected crash"))
        });

        assert!(result.is_err());
        assert!(!store.exists("m/d/seed_1/a.json").unwrap());
        assert_eq!(store.get("m/d/seed_1/a.json").unwrap(), None);
        assert!(store.keys("").unwrap().is_empty());
        // The temp file is cleaned up on the error path
        assert_eq!(store.remove_partials(Duration::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_interrupted_overwrite_keeps_previous_value() {
        let (_dir, store) = store();
        store.set("k.json", b"old".to_vec()).unwrap();
        let path = store.path_for("k.json").unwrap();

        let result = write_atomic(&path, b"new", |_| {
            Err(io::Error::new(io::ErrorKind::Other, "injected crash"))
        });

        assert!(result.is_err());
        assert_eq!(store.get("k.json").unwrap(), Some(b"old".to_vec()));
    }

    #[test]
    fn test_orphaned_partial_is_ignored_and_removable() {
        let (_dir, store) = store();
        store.set("m/d/seed_1/a.json", b"{}".to_vec()).unwrap();
        let orphan = store.root().join("m/d/seed_1/.partial-abc123");
        fs::write(&orphan, b"{\"trunc").unwrap();

        assert_eq!(store.keys("").unwrap(), vec!["m/d/seed_1/a.json".to_string()]);
        assert!(store.exists(".partial-abc123").is_err());

        assert_eq!(store.remove_partials(Duration::ZERO).unwrap(), 1);
        assert!(!orphan.exists());
        assert!(store.exists("m/d/seed_1/a.json").unwrap());
    }

    #[test]
    fn test_cleanup_by_another_handle_spares_inflight_commit() {
        let (_dir, writer) = store();
        let cleaner = FsKvStore::open(writer.root()).unwrap();
        let path = writer.path_for("m/d/seed_1/a.json").unwrap();

        write_atomic(&path, b"{\"complete\": true}", |tmp| {
            assert_eq!(cleaner.remove_partials(Duration::from_secs(60)).unwrap(), 0);
            assert!(tmp.is_file());
            Ok(())
        })
        .unwrap();

        assert!(cleaner.exists("m/d/seed_1/a.json").unwrap());
        assert_eq!(
            writer.get("m/d/seed_1/a.json").unwrap(),
            Some(b"{\"complete\": true}".to_vec())
        );
    }

    #[test]
    fn test_remove_partials_keeps_recent_files() {
        let (_dir, store) = store();
        store.set("m/d/seed_1/a.json", b"{}".to_vec()).unwrap();
        let fresh = store.root().join("m/d/seed_1/.partial-fresh1");
        fs::write(&fresh, b"{\"trunc").unwrap();

        assert_eq!(store.remove_partials(Duration::from_secs(3600)).unwrap(), 0);
        assert!(fresh.exists());
        assert_eq!(store.remove_partials(Duration::ZERO).unwrap(), 1);
        assert!(!fresh.exists());
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let (_dir, store) = store();
        for key in ["", "/abs", "../up", "a/../b", "a//b", "a/./b", "a\\b", "a/"] {
            assert!(
                matches!(store.set(key, vec![]), Err(Error::InvalidKey(_))),
                "{key}"
            );
        }
    }

    #[test]
    fn test_directory_is_not_a_key() {
        let (_dir, store) = store();
        store.set("m/d/a.json", vec![]).unwrap();
        assert!(!store.exists("m/d").unwrap());
        assert_eq!(store.get("m/d").unwrap(), None);
    }
}
