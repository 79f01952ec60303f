//! Experiment Store - deduplicating persistence for experiment records
//!
//! This module owns the persisted namespace of experiment results. Every
//! record lives under the storage key of its [`IdentityKey`], so the
//! existence of a key is the answer to "has this experiment already run?".

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use super::ExperimentRecord;
use crate::identity::{ExperimentIdentity, IdentityKey, DEFAULT_PRECISION, RECORD_EXTENSION};
use crate::kv::{FsKvStore, KvStore, MemoryKvStore};
use crate::Result;

/// Store for experiment records over any [`KvStore`] backend.
///
/// ## Design
///
/// - `exists` only reports committed records: the backend's `set` is
///   all-or-nothing, so a write interrupted by a crash is never mistaken
///   for a finished experiment.
/// - There is no cross-process lock. Two workers may both see "missing"
///   and both commit the same identity; the second write replaces the
///   first with an equivalent record. That costs compute, not correctness.
#[derive(Debug)]
pub struct ExperimentStore<K = FsKvStore> {
    backend: K,
    precision: usize,
}

impl ExperimentStore<FsKvStore> {
    /// Open a directory-backed store rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created.
    pub fn open_dir(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(FsKvStore::open(path)?))
    }

    /// Delete temporary files of interrupted commits older than `older_than`.
    ///
    /// # Errors
    ///
    /// See [`FsKvStore::remove_partials`].
    pub fn remove_partials(&self, older_than: Duration) -> Result<usize> {
        self.backend.remove_partials(older_than)
    }
}

impl ExperimentStore<MemoryKvStore> {
    /// Create an in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryKvStore::new())
    }
}

impl<K: KvStore> ExperimentStore<K> {
    /// Wrap a backend with the default key precision.
    #[must_use]
    pub fn new(backend: K) -> Self {
        Self {
            backend,
            precision: DEFAULT_PRECISION,
        }
    }

    /// Use a different float precision for identity keys.
    #[must_use]
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Float precision used for identity keys.
    #[must_use]
    pub const fn precision(&self) -> usize {
        self.precision
    }

    /// Get the backend.
    #[must_use]
    pub const fn backend(&self) -> &K {
        &self.backend
    }

    /// Derive the key an identity is stored under.
    ///
    /// # Errors
    ///
    /// See [`IdentityKey::derive`].
    pub fn key_for(&self, identity: &ExperimentIdentity) -> Result<IdentityKey> {
        identity.key(self.precision)
    }

    /// Whether a committed record exists for `identity`.
    ///
    /// # Errors
    ///
    /// Returns error if the key cannot be derived or the backend fails.
    pub fn exists(&self, identity: &ExperimentIdentity) -> Result<bool> {
        self.contains(&self.key_for(identity)?)
    }

    /// Whether a committed record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails.
    pub fn contains(&self, key: &IdentityKey) -> Result<bool> {
        self.backend.exists(&key.storage_key())
    }

    /// Commit `record` for `identity`.
    ///
    /// After this returns `Ok`, `exists(identity)` is true. On error no
    /// record becomes visible.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded or written.
    pub fn commit(
        &self,
        identity: &ExperimentIdentity,
        record: &ExperimentRecord,
    ) -> Result<IdentityKey> {
        let key = self.key_for(identity)?;
        self.commit_at(&key, record)?;
        Ok(key)
    }

    /// Commit `record` under an already derived `key`.
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded or written.
    pub fn commit_at(&self, key: &IdentityKey, record: &ExperimentRecord) -> Result<()> {
        let bytes = record.to_json_vec()?;
        self.backend.set(&key.storage_key(), bytes)?;
        debug!(key = %key, failed = record.is_failure(), "record committed");
        Ok(())
    }

    /// Load the committed record for `identity`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails or the stored bytes are not a
    /// valid record.
    pub fn load(&self, identity: &ExperimentIdentity) -> Result<Option<ExperimentRecord>> {
        let key = self.key_for(identity)?;
        self.backend
            .get(&key.storage_key())?
            .map(|bytes| ExperimentRecord::from_json_slice(&bytes))
            .transpose()
    }

    /// Entry names committed in one (model, dataset, seed) scope, sorted.
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be listed.
    pub fn list(&self, model: &str, dataset: &str, seed: u64) -> Result<Vec<String>> {
        let prefix = IdentityKey::scope_prefix(model, dataset, seed);
        let suffix = format!(".{RECORD_EXTENSION}");
        Ok(self
            .backend
            .keys(&prefix)?
            .into_iter()
            .filter_map(|key| {
                let name = key.strip_prefix(&prefix)?;
                // Skip anything nested deeper than the scope
                if name.contains('/') {
                    return None;
                }
                name.strip_suffix(&suffix).map(str::to_string)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Configuration;

    fn identity(seed: u64, lr: f64) -> ExperimentIdentity {
        ExperimentIdentity::new("ae", "mnist", seed, Configuration::new().with("lr", lr))
    }

    fn record(identity: &ExperimentIdentity) -> ExperimentRecord {
        let key = identity.key(DEFAULT_PRECISION).unwrap();
        ExperimentRecord::builder(identity, &key).build()
    }

    #[test]
    fn test_store_exists_after_commit() {
        let store = ExperimentStore::in_memory();
        let id = identity(1, 0.001);

        assert!(!store.exists(&id).unwrap());
        store.commit(&id, &record(&id)).unwrap();
        assert!(store.exists(&id).unwrap());

        // Different seed, same configuration: separate namespace
        assert!(!store.exists(&identity(2, 0.001)).unwrap());
    }

    #[test]
    fn test_store_load_roundtrip() {
        let store = ExperimentStore::in_memory();
        let id = identity(1, 0.01);
        assert!(store.load(&id).unwrap().is_none());

        let original = record(&id);
        store.commit(&id, &original).unwrap();
        assert_eq!(store.load(&id).unwrap(), Some(original));
    }

    #[test]
    fn test_store_list_scope() {
        let store = ExperimentStore::in_memory();
        for lr in [0.1, 0.01] {
            let id = identity(1, lr);
            store.commit(&id, &record(&id)).unwrap();
        }
        let other = identity(2, 0.5);
        store.commit(&other, &record(&other)).unwrap();

        assert_eq!(store.list("ae", "mnist", 1).unwrap(), vec!["lr=0.01", "lr=0.1"]);
        assert_eq!(store.list("ae", "mnist", 2).unwrap(), vec!["lr=0.5"]);
        assert!(store.list("ae", "cifar", 1).unwrap().is_empty());
    }

    #[test]
    fn test_store_precision_controls_dedup() {
        let coarse = ExperimentStore::in_memory().with_precision(2);
        let a = identity(1, 0.0123);
        let b = identity(1, 0.0124);
        coarse.commit(&a, &record(&a)).unwrap();
        assert!(coarse.exists(&b).unwrap());
        assert_eq!(coarse.precision(), 2);

        let fine = ExperimentStore::in_memory();
        fine.commit(&a, &record(&a)).unwrap();
        assert!(!fine.exists(&b).unwrap());
    }

    #[test]
    fn test_store_open_dir_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ExperimentStore::open_dir(dir.path()).unwrap();
        let id = identity(1, 0.001);
        let key = store.commit(&id, &record(&id)).unwrap();

        let path = dir.path().join("ae/mnist/seed_1").join(key.file_name());
        assert!(path.is_file());
        assert_eq!(store.remove_partials(Duration::ZERO).unwrap(), 0);
        assert!(store.backend().root().ends_with(dir.path().file_name().unwrap()));
    }

    #[test]
    fn test_store_load_rejects_corrupt_entry() {
        let store = ExperimentStore::in_memory();
        let id = identity(1, 0.001);
        let key = store.key_for(&id).unwrap();
        store
            .backend()
            .set(&key.storage_key(), b"{\"key\": ".to_vec())
            .unwrap();
        assert!(store.load(&id).is_err());
    }
}
