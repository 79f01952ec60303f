//! Key-Value Store Module
//!
//! The persistence seam under [`ExperimentStore`](crate::experiment::ExperimentStore):
//! - [`FsKvStore`]: one file per key under a root directory, atomic commit
//! - [`MemoryKvStore`]: lock-free in-memory map, for tests and dry runs
//!
//! Keys are `/`-separated paths such as `ae/mnist/seed_1/lr=0.001.json`.
//!
//! # Example
//!
//! ```rust
//! use anomaly_sweep::kv::{KvStore, MemoryKvStore};
//!
//! # fn example() -> anomaly_sweep::Result<()> {
//! let store = MemoryKvStore::new();
//!
//! store.set("ae/mnist/seed_1/a.json", b"{}".to_vec())?;
//! assert!(store.exists("ae/mnist/seed_1/a.json")?);
//! assert_eq!(store.keys("ae/mnist/")?, vec!["ae/mnist/seed_1/a.json".to_string()]);
//!
//! store.delete("ae/mnist/seed_1/a.json")?;
//! assert!(!store.exists("ae/mnist/seed_1/a.json")?);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod fs;
mod memory;

pub use fs::FsKvStore;
pub use memory::MemoryKvStore;

use crate::Result;

/// Key-value store trait backing experiment persistence.
///
/// `set` must be all-or-nothing: a reader either sees the complete new
/// value or no value at all, never a partial write. No cross-process
/// locking is implied; concurrent writers to the same key race and the
/// last complete write wins.
pub trait KvStore: Send + Sync {
    /// Get a value by key.
    ///
    /// Returns `None` if the key doesn't exist.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a value for a key.
    ///
    /// Overwrites any existing value.
    ///
    /// # Errors
    /// Returns error if the write cannot be completed; the key is then
    /// left as it was before the call.
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key.
    ///
    /// No-op if the key doesn't exist.
    ///
    /// # Errors
    /// Returns error if the backend refuses the removal.
    fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists.
    ///
    /// # Errors
    /// Returns error if the backend cannot be queried.
    fn exists(&self, key: &str) -> Result<bool>;

    /// All committed keys starting with `prefix`, sorted.
    ///
    /// # Errors
    /// Returns error if the backend cannot be listed.
    fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get multiple keys in a batch.
    ///
    /// Returns values in the same order as keys. Missing keys return `None`.
    ///
    /// # Errors
    /// Returns the first backend error encountered.
    fn batch_get(&self, keys: &[&str]) -> Result<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================
    // Contract tests shared by every backend
    // ============================================================

    fn check_set_get(store: &impl KvStore) {
        store.set("a/key1", b"value1".to_vec()).unwrap();
        assert_eq!(store.get("a/key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get("a/nonexistent").unwrap(), None);
    }

    fn check_overwrite(store: &impl KvStore) {
        store.set("a/key", b"value1".to_vec()).unwrap();
        store.set("a/key", b"value2".to_vec()).unwrap();
        assert_eq!(store.get("a/key").unwrap(), Some(b"value2".to_vec()));
    }

    fn check_delete(store: &impl KvStore) {
        store.set("a/key", b"value".to_vec()).unwrap();
        store.delete("a/key").unwrap();
        assert_eq!(store.get("a/key").unwrap(), None);
        // Should not error
        store.delete("a/nonexistent").unwrap();
    }

    fn check_exists(store: &impl KvStore) {
        assert!(!store.exists("a/key").unwrap());
        store.set("a/key", b"value".to_vec()).unwrap();
        assert!(store.exists("a/key").unwrap());
        store.delete("a/key").unwrap();
        assert!(!store.exists("a/key").unwrap());
    }

    fn check_keys(store: &impl KvStore) {
        store.set("m/d/seed_2/b.json", vec![]).unwrap();
        store.set("m/d/seed_1/a.json", vec![]).unwrap();
        store.set("m/e/seed_1/c.json", vec![]).unwrap();
        assert_eq!(
            store.keys("m/d/").unwrap(),
            vec!["m/d/seed_1/a.json".to_string(), "m/d/seed_2/b.json".to_string()]
        );
        assert_eq!(store.keys("").unwrap().len(), 3);
        assert!(store.keys("x/").unwrap().is_empty());
    }

    fn check_batch_get(store: &impl KvStore) {
        store.set("a", b"1".to_vec()).unwrap();
        store.set("b", b"2".to_vec()).unwrap();
        // "c" intentionally not set
        let results = store.batch_get(&["a", "b", "c"]).unwrap();
        assert_eq!(results, vec![Some(b"1".to_vec()), Some(b"2".to_vec()), None]);
    }

    fn check_empty_value(store: &impl KvStore) {
        store.set("key", vec![]).unwrap();
        assert_eq!(store.get("key").unwrap(), Some(vec![]));
        assert!(store.exists("key").unwrap());
    }

    #[test]
    fn test_memory_kv_contract() {
        check_set_get(&MemoryKvStore::new());
        check_overwrite(&MemoryKvStore::new());
        check_delete(&MemoryKvStore::new());
        check_exists(&MemoryKvStore::new());
        check_keys(&MemoryKvStore::new());
        check_batch_get(&MemoryKvStore::new());
        check_empty_value(&MemoryKvStore::new());
    }

    #[test]
    fn test_fs_kv_contract() {
        let fresh = || {
            let dir = tempfile::tempdir().unwrap();
            let store = FsKvStore::open(dir.path()).unwrap();
            (dir, store)
        };
        let (_d, s) = fresh();
        check_set_get(&s);
        let (_d, s) = fresh();
        check_overwrite(&s);
        let (_d, s) = fresh();
        check_delete(&s);
        let (_d, s) = fresh();
        check_exists(&s);
        let (_d, s) = fresh();
        check_keys(&s);
        let (_d, s) = fresh();
        check_batch_get(&s);
        let (_d, s) = fresh();
        check_empty_value(&s);
    }
}
