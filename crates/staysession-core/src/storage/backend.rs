use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain access failed: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// A flat string key/value store.
pub trait StorageBackend: Send + Sync {
    /// Short label used in logs and status output
    fn name(&self) -> &str;

    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-lifetime storage. Stands in for session-scoped storage.
#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// ============================================================================
// File backend
// ============================================================================

/// All keys of one backend live in a single JSON object file.
/// The file is removed once its last key is removed.
///
/// Reads report an unparsable file as an error. Writes and removals treat
/// it as empty and replace it, so a corrupt file can always be repaired
/// or cleared.
pub struct FileBackend {
    name: String,
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    guard: Mutex<()>,
}

impl FileBackend {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Load for modification. An unparsable file counts as empty; the flag
    /// reports that it must be rewritten.
    fn load_for_update(&self) -> Result<(BTreeMap<String, String>, bool), StorageError> {
        match self.load() {
            Ok(entries) => Ok((entries, false)),
            Err(StorageError::Serialization(e)) => {
                warn!(
                    backend = %self.name,
                    path = %self.path.display(),
                    error = %e,
                    "Storage file is corrupt, replacing it"
                );
                Ok((BTreeMap::new(), true))
            }
            Err(e) => Err(e),
        }
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let contents = serde_json::to_string_pretty(entries)?;
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut entries, _) = self.load_for_update()?;
        entries.insert(key.to_string(), value.to_string());
        self.store(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut entries, corrupt) = self.load_for_update()?;
        if entries.remove(key).is_some() || corrupt {
            self.store(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_basic_ops() {
        let backend = MemoryBackend::new("memory");
        assert_eq!(backend.read("k").expect("read"), None);

        backend.write("k", "v").expect("write");
        assert_eq!(backend.read("k").expect("read").as_deref(), Some("v"));
        assert_eq!(backend.len(), 1);

        backend.remove("k").expect("remove");
        backend.remove("k").expect("second remove is a no-op");
        assert!(backend.is_empty());
    }

    #[test]
    fn test_file_backend_persists_across_instances() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("durable.json");

        let backend = FileBackend::new("durable", path.clone());
        backend.write("principal", r#"{"id":"u1"}"#).expect("write");
        backend.write("access_credential", "tok").expect("write");

        let reopened = FileBackend::new("durable", path.clone());
        assert_eq!(
            reopened.read("principal").expect("read").as_deref(),
            Some(r#"{"id":"u1"}"#)
        );
        assert_eq!(reopened.read("missing").expect("read"), None);
    }

    #[test]
    fn test_file_backend_removes_file_when_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        let backend = FileBackend::new("durable", path.clone());

        backend.write("a", "1").expect("write");
        assert!(path.exists());
        backend.remove("a").expect("remove");
        assert!(!path.exists());
        backend.remove("a").expect("remove missing");
    }

    #[test]
    fn test_file_backend_corrupt_file_reports_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").expect("seed corrupt file");

        let backend = FileBackend::new("durable", path);
        assert!(matches!(
            backend.read("a"),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_file_backend_write_replaces_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").expect("seed corrupt file");

        let backend = FileBackend::new("durable", path.clone());
        backend.write("a", "1").expect("write over corrupt file");
        assert_eq!(backend.read("a").expect("read").as_deref(), Some("1"));

        let contents = std::fs::read_to_string(&path).expect("read file");
        let parsed: BTreeMap<String, String> = serde_json::from_str(&contents).expect("valid json");
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_file_backend_remove_deletes_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").expect("seed corrupt file");

        let backend = FileBackend::new("durable", path.clone());
        backend.remove("a").expect("remove from corrupt file");
        assert!(!path.exists());
        assert_eq!(backend.read("a").expect("read"), None);
    }

    #[test]
    fn test_file_backend_leaves_no_temp_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.json");
        let backend = FileBackend::new("durable", path);

        backend.write("a", "1").expect("write");
        backend.write("b", "2").expect("write");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("store.json")]);
    }
}
