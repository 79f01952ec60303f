//! Process-local record namespace.
//!
//! Holds experiment records keyed by storage key for as long as the process
//! lives. Identities committed here are skipped by later draws of the same
//! process only; a restart forgets them, so use it for tests, benchmarks and
//! dry runs, never for a sweep spread over several invocations.

use dashmap::DashMap;

use super::KvStore;
use crate::Result;

/// Storage keys to record bytes, shared across threads.
///
/// The storage key alone answers "has this identity run?": `exists` is a map
/// lookup and a record becomes visible in one `insert`, so a concurrent
/// reader sees either no record or a complete one. Prefix listing walks the
/// whole map, which is fine at the size of one sweep.
///
/// # Example
///
/// ```rust
/// use anomaly_sweep::kv::{KvStore, MemoryKvStore};
///
/// # fn example() -> anomaly_sweep::Result<()> {
/// let store = MemoryKvStore::new();
/// store.set("ae/mnist/seed_1/lr=0.001.json", b"{}".to_vec())?;
/// assert!(store.exists("ae/mnist/seed_1/lr=0.001.json")?);
/// assert!(!store.exists("ae/mnist/seed_2/lr=0.001.json")?);
/// assert_eq!(store.records_in("ae/mnist/seed_1/"), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryKvStore {
    /// Create an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of committed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been committed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records under a storage prefix, e.g. one seed scope.
    #[must_use]
    pub fn records_in(&self, prefix: &str) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .count()
    }

    /// Forget every record, so every identity counts as fresh again.
    pub fn clear(&self) {
        self.records.clear();
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).map(|record| record.value().clone()))
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.records.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.records.contains_key(key))
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_racing_commits_of_one_identity_leave_one_record() {
        let store = Arc::new(MemoryKvStore::new());
        let key = "ae/mnist/seed_1/lr=0.001.json";
        let handles: Vec<_> = (0..16)
            .map(|worker| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let record = format!("{{\"worker\": {worker}}}").into_bytes();
                    store.set(key, record).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 1);
        let record = store.get(key).unwrap().unwrap();
        assert!(record.starts_with(b"{\"worker\": "));
    }

    #[test]
    fn test_seed_scopes_are_disjoint() {
        let store = MemoryKvStore::new();
        store.set("ae/mnist/seed_1/lr=0.001.json", b"{}".to_vec()).unwrap();
        store.set("ae/mnist/seed_1/lr=0.01.json", b"{}".to_vec()).unwrap();
        store.set("ae/mnist/seed_10/lr=0.001.json", b"{}".to_vec()).unwrap();

        assert_eq!(store.records_in("ae/mnist/seed_1/"), 2);
        assert_eq!(store.records_in("ae/mnist/seed_10/"), 1);
        assert_eq!(store.records_in("ae/mnist/seed_2/"), 0);
    }

    #[test]
    fn test_clear_makes_identities_fresh() {
        let store = MemoryKvStore::default();
        assert!(store.is_empty());

        store.set("ae/mnist/seed_1/default.json", b"{}".to_vec()).unwrap();
        assert!(store.exists("ae/mnist/seed_1/default.json").unwrap());

        store.clear();
        assert!(store.is_empty());
        assert!(!store.exists("ae/mnist/seed_1/default.json").unwrap());
    }
}
