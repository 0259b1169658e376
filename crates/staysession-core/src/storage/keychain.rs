use keyring::Entry;
use tracing::debug;

use super::backend::{StorageBackend, StorageError};

/// Default keychain service name for stored session keys
pub const SERVICE_NAME: &str = "staysession";

/// Durable storage in the OS keychain, one entry per key.
///
/// Every write is read back through a fresh entry. Keyring's mock store
/// (used when no native store is available) accepts writes but never
/// returns them, which surfaces here as `StorageError::Unavailable`.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringBackend {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

/// Check that a value written to the keychain can be read back
fn verify_persisted(
    read_back: Result<String, keyring::Error>,
    expected: &str,
) -> Result<(), StorageError> {
    match read_back {
        Ok(value) if value == expected => Ok(()),
        Ok(_) => Err(StorageError::Unavailable(
            "keychain returned a different value than written".to_string(),
        )),
        Err(keyring::Error::NoEntry) => Err(StorageError::Unavailable(
            "keychain did not retain the value (no native credential store)".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

impl StorageBackend for KeyringBackend {
    fn name(&self) -> &str {
        "keyring"
    }

    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value)?;
        verify_persisted(self.entry(key)?.get_password(), value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!(service = %self.service, key, "Keychain entry already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
