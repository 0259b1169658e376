//! A record replicated across a prioritized list of storage backends.
//!
//! Writes go to every backend. Reads take the first backend (in priority
//! order) holding a valid record and copy it back into every backend ahead
//! of it (read-repair). Backend failures are logged and never propagated:
//! any single backend may be unavailable.

use std::sync::Arc;

use tracing::{debug, warn};

use super::backend::{StorageBackend, StorageError};

/// A value stored as a fixed set of string keys.
pub trait Record: Sized {
    /// Every key the record may occupy in a backend
    const KEYS: &'static [&'static str];

    /// Key/value pairs to persist. Keys in `KEYS` but missing here are
    /// removed on write.
    fn to_entries(&self) -> Result<Vec<(&'static str, String)>, StorageError>;

    /// Rebuild a record from a backend. Returns `None` for an absent or
    /// partial record.
    fn from_entries(lookup: &dyn Fn(&str) -> Option<String>) -> Option<Self>;
}

/// Which keys of a record are present in one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaStatus {
    pub backend: String,
    pub present: Vec<(&'static str, bool)>,
}

impl ReplicaStatus {
    pub fn has(&self, key: &str) -> bool {
        self.present.iter().any(|(k, present)| *k == key && *present)
    }

    pub fn is_empty(&self) -> bool {
        self.present.iter().all(|(_, present)| !present)
    }
}

pub struct ReplicatedStore<R> {
    backends: Vec<Arc<dyn StorageBackend>>,
    _record: std::marker::PhantomData<fn() -> R>,
}

impl<R: Record> ReplicatedStore<R> {
    /// `backends` in priority order, highest first
    pub fn new(backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        Self {
            backends,
            _record: std::marker::PhantomData,
        }
    }

    pub fn backends(&self) -> &[Arc<dyn StorageBackend>] {
        &self.backends
    }

    fn write_to(backend: &dyn StorageBackend, entries: &[(&'static str, String)]) -> bool {
        let mut ok = true;
        for key in R::KEYS {
            let result = match entries.iter().find(|(k, _)| k == key) {
                Some((_, value)) => backend.write(key, value),
                None => backend.remove(key),
            };
            if let Err(e) = result {
                warn!(backend = backend.name(), key, error = %e, "Failed to write replica key");
                ok = false;
            }
        }
        ok
    }

    /// Write to every backend. `true` only if all of them succeeded.
    pub fn write(&self, record: &R) -> bool {
        let entries = match record.to_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to serialize record, nothing written");
                return false;
            }
        };

        let mut all_ok = true;
        for backend in &self.backends {
            if !Self::write_to(backend.as_ref(), &entries) {
                all_ok = false;
            }
        }
        all_ok
    }

    fn read_backend(backend: &dyn StorageBackend) -> Option<R> {
        let lookup = |key: &str| match backend.read(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(backend = backend.name(), key, error = %e, "Failed to read replica key");
                None
            }
        };
        R::from_entries(&lookup)
    }

    /// Read a single replica without repairing the others
    pub fn read_from(&self, index: usize) -> Option<R> {
        self.backends
            .get(index)
            .and_then(|backend| Self::read_backend(backend.as_ref()))
    }

    /// First valid replica wins; it is promoted into every
    /// higher-priority backend before being returned.
    pub fn read(&self) -> Option<R> {
        for (index, backend) in self.backends.iter().enumerate() {
            let Some(record) = Self::read_backend(backend.as_ref()) else {
                debug!(backend = backend.name(), "No valid record in replica");
                continue;
            };

            if index > 0 {
                self.promote(&record, index);
            }
            return Some(record);
        }
        None
    }

    fn promote(&self, record: &R, source: usize) {
        let entries = match record.to_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to serialize record for promotion");
                return;
            }
        };
        for backend in &self.backends[..source] {
            if Self::write_to(backend.as_ref(), &entries) {
                debug!(
                    from = self.backends[source].name(),
                    to = backend.name(),
                    "Promoted record into higher-priority replica"
                );
            }
        }
    }

    /// Remove every key from every backend, best effort
    pub fn clear(&self) {
        for backend in &self.backends {
            for key in R::KEYS {
                if let Err(e) = backend.remove(key) {
                    warn!(backend = backend.name(), key, error = %e, "Failed to remove replica key");
                }
            }
        }
    }

    /// Presence of each key per backend. Never exposes values.
    pub fn status(&self) -> Vec<ReplicaStatus> {
        self.backends
            .iter()
            .map(|backend| ReplicaStatus {
                backend: backend.name().to_string(),
                present: R::KEYS
                    .iter()
                    .map(|key| {
                        let present = matches!(backend.read(key), Ok(Some(_)));
                        (*key, present)
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::storage::backend::MemoryBackend;

    /// Backend whose every operation fails, for exercising best-effort paths
    pub(crate) struct BrokenBackend;

    impl StorageBackend for BrokenBackend {
        fn name(&self) -> &str {
            "broken"
        }

        fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disabled".to_string()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("quota exceeded".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".to_string()))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Pair {
        left: String,
        right: Option<String>,
    }

    impl Record for Pair {
        const KEYS: &'static [&'static str] = &["left", "right"];

        fn to_entries(&self) -> Result<Vec<(&'static str, String)>, StorageError> {
            let mut entries = vec![("left", self.left.clone())];
            if let Some(ref right) = self.right {
                entries.push(("right", right.clone()));
            }
            Ok(entries)
        }

        fn from_entries(lookup: &dyn Fn(&str) -> Option<String>) -> Option<Self> {
            Some(Pair {
                left: lookup("left")?,
                right: lookup("right"),
            })
        }
    }

    fn pair(left: &str, right: Option<&str>) -> Pair {
        Pair {
            left: left.to_string(),
            right: right.map(str::to_string),
        }
    }

    fn three_tier() -> (Vec<Arc<MemoryBackend>>, ReplicatedStore<Pair>) {
        let tiers: Vec<Arc<MemoryBackend>> = ["a", "b", "c"]
            .iter()
            .map(|n| Arc::new(MemoryBackend::new(n)))
            .collect();
        let backends = tiers
            .iter()
            .map(|t| t.clone() as Arc<dyn StorageBackend>)
            .collect();
        (tiers, ReplicatedStore::new(backends))
    }

    #[test]
    fn test_write_reaches_every_backend() {
        let (tiers, store) = three_tier();
        assert!(store.write(&pair("x", Some("y"))));
        for tier in &tiers {
            assert_eq!(tier.len(), 2);
        }
    }

    #[test]
    fn test_write_removes_keys_the_record_lacks() {
        let (_tiers, store) = three_tier();
        store.write(&pair("x", Some("y")));
        store.write(&pair("z", None));
        assert_eq!(store.read(), Some(pair("z", None)));
    }

    #[test]
    fn test_read_promotes_from_lowest_tier() {
        let (tiers, store) = three_tier();
        tiers[2].write("left", "only-c").expect("seed");

        assert_eq!(store.read(), Some(pair("only-c", None)));
        assert_eq!(store.read_from(0), Some(pair("only-c", None)));
        assert_eq!(store.read_from(1), Some(pair("only-c", None)));
    }

    #[test]
    fn test_highest_priority_wins_when_replicas_diverge() {
        let (tiers, store) = three_tier();
        tiers[0].write("left", "first").expect("seed");
        tiers[1].write("left", "second").expect("seed");

        assert_eq!(store.read(), Some(pair("first", None)));
        // No repair needed, lower tier keeps its own value
        assert_eq!(store.read_from(1), Some(pair("second", None)));
    }

    #[test]
    fn test_partial_record_is_skipped() {
        let (tiers, store) = three_tier();
        tiers[0].write("right", "orphan").expect("seed");
        tiers[1].write("left", "whole").expect("seed");

        assert_eq!(store.read(), Some(pair("whole", None)));
        // Promotion overwrote the partial record and dropped the orphan key
        assert_eq!(tiers[0].read("right").expect("read"), None);
    }

    #[test]
    fn test_broken_backend_does_not_block_others() {
        let healthy = Arc::new(MemoryBackend::new("healthy"));
        let store: ReplicatedStore<Pair> = ReplicatedStore::new(vec![
            Arc::new(BrokenBackend) as Arc<dyn StorageBackend>,
            healthy.clone() as Arc<dyn StorageBackend>,
        ]);

        assert!(!store.write(&pair("x", None)));
        assert_eq!(healthy.read("left").expect("read").as_deref(), Some("x"));
        assert_eq!(store.read(), Some(pair("x", None)));

        store.clear();
        assert!(healthy.is_empty());
    }

    #[test]
    fn test_status_reports_presence_only() {
        let (_tiers, store) = three_tier();
        store.write(&pair("secret", None));

        let status = store.status();
        assert_eq!(status.len(), 3);
        assert!(status[0].has("left"));
        assert!(!status[0].has("right"));

        store.clear();
        assert!(store.status().iter().all(ReplicaStatus::is_empty));
    }
}
