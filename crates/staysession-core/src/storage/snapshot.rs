use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use super::backend::{StorageBackend, StorageError};
use super::replicated::{Record, ReplicaStatus, ReplicatedStore};
use crate::models::{Principal, SessionSnapshot};

/// Storage key for the principal, stored as JSON text
pub const PRINCIPAL_KEY: &str = "principal";
pub const ACCESS_CREDENTIAL_KEY: &str = "access_credential";
/// Absent when the server issued no refresh credential
pub const REFRESH_CREDENTIAL_KEY: &str = "refresh_credential";

impl Record for SessionSnapshot {
    const KEYS: &'static [&'static str] =
        &[PRINCIPAL_KEY, ACCESS_CREDENTIAL_KEY, REFRESH_CREDENTIAL_KEY];

    fn to_entries(&self) -> Result<Vec<(&'static str, String)>, StorageError> {
        let mut entries = vec![
            (PRINCIPAL_KEY, serde_json::to_string(&self.principal)?),
            (ACCESS_CREDENTIAL_KEY, self.access_credential.clone()),
        ];
        if let Some(ref refresh) = self.refresh_credential {
            entries.push((REFRESH_CREDENTIAL_KEY, refresh.clone()));
        }
        Ok(entries)
    }

    fn from_entries(lookup: &dyn Fn(&str) -> Option<String>) -> Option<Self> {
        let principal_json = lookup(PRINCIPAL_KEY)?;
        let access_credential = lookup(ACCESS_CREDENTIAL_KEY).filter(|t| !t.is_empty())?;

        let principal: Principal = match serde_json::from_str(&principal_json) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "Stored principal is not valid JSON, ignoring snapshot");
                return None;
            }
        };

        Some(SessionSnapshot {
            principal,
            access_credential,
            refresh_credential: lookup(REFRESH_CREDENTIAL_KEY),
        })
    }
}

/// The two storage tiers, in read priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Survives restarts
    Durable,
    /// Lives only as long as the login session
    Ephemeral,
}

impl Tier {
    fn index(self) -> usize {
        match self {
            Tier::Durable => 0,
            Tier::Ephemeral => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct KeyPresence {
    pub principal: bool,
    pub access_credential: bool,
    pub refresh_credential: bool,
}

impl KeyPresence {
    fn from_replica(status: Option<&ReplicaStatus>) -> Self {
        match status {
            Some(s) => Self {
                principal: s.has(PRINCIPAL_KEY),
                access_credential: s.has(ACCESS_CREDENTIAL_KEY),
                refresh_credential: s.has(REFRESH_CREDENTIAL_KEY),
            },
            None => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.principal && !self.access_credential && !self.refresh_credential
    }

    pub fn is_complete(&self) -> bool {
        self.principal && self.access_credential && self.refresh_credential
    }
}

/// Diagnostic view of both tiers. Never carries credential contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct StoreStatus {
    pub durable: KeyPresence,
    pub ephemeral: KeyPresence,
}

/// Session snapshot persisted redundantly in a durable and an ephemeral
/// backend. The durable copy wins whenever both are valid; a snapshot
/// found only in the ephemeral backend is copied back into the durable one.
pub struct SessionStore {
    replicas: ReplicatedStore<SessionSnapshot>,
}

impl SessionStore {
    pub fn new(durable: Arc<dyn StorageBackend>, ephemeral: Arc<dyn StorageBackend>) -> Self {
        Self {
            replicas: ReplicatedStore::new(vec![durable, ephemeral]),
        }
    }

    pub fn write(&self, snapshot: &SessionSnapshot) -> bool {
        let ok = self.replicas.write(snapshot);
        debug!(
            ok,
            has_refresh = snapshot.refresh_credential.is_some(),
            "Session snapshot written"
        );
        ok
    }

    pub fn read(&self) -> Option<SessionSnapshot> {
        self.replicas.read()
    }

    /// Read one tier directly, without promotion
    pub fn read_tier(&self, tier: Tier) -> Option<SessionSnapshot> {
        self.replicas.read_from(tier.index())
    }

    pub fn clear(&self) {
        self.replicas.clear();
        info!("Session snapshot cleared from all storage");
    }

    pub fn status(&self) -> StoreStatus {
        let replicas = self.replicas.status();
        StoreStatus {
            durable: KeyPresence::from_replica(replicas.get(Tier::Durable.index())),
            ephemeral: KeyPresence::from_replica(replicas.get(Tier::Ephemeral.index())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::storage::backend::MemoryBackend;
    use crate::storage::replicated::tests::BrokenBackend;

    fn fixture() -> (Arc<MemoryBackend>, Arc<MemoryBackend>, SessionStore) {
        let durable = Arc::new(MemoryBackend::new("durable"));
        let ephemeral = Arc::new(MemoryBackend::new("ephemeral"));
        let store = SessionStore::new(durable.clone(), ephemeral.clone());
        (durable, ephemeral, store)
    }

    fn snapshot() -> SessionSnapshot {
        SessionSnapshot::new(
            Principal::new("u1")
                .with_role(Role::Tourist)
                .with_attribute("email", "u1@example.com"),
            "access-1",
            Some("refresh-1".to_string()),
        )
    }

    #[test]
    fn test_write_then_clear_reads_absent() {
        let (_, _, store) = fixture();
        assert!(store.write(&snapshot()));
        store.clear();
        assert_eq!(store.read(), None);
        assert_eq!(store.status(), StoreStatus::default());
    }

    #[test]
    fn test_write_read_round_trip() {
        let (_, _, store) = fixture();
        let snap = snapshot();
        store.write(&snap);
        assert_eq!(store.read(), Some(snap.clone()));

        let without_refresh = SessionSnapshot::new(Principal::new("u2"), "access-2", None);
        store.write(&without_refresh);
        assert_eq!(store.read(), Some(without_refresh));
    }

    #[test]
    fn test_ephemeral_copy_heals_durable() {
        let (durable, ephemeral, store) = fixture();
        let snap = snapshot();
        for (key, value) in snap.to_entries().expect("entries") {
            ephemeral.write(key, &value).expect("seed ephemeral");
        }
        assert!(durable.is_empty());

        assert_eq!(store.read(), Some(snap.clone()));
        assert_eq!(store.read_tier(Tier::Durable), Some(snap));
    }

    #[test]
    fn test_durable_wins_ties() {
        let (_, ephemeral, store) = fixture();
        store.write(&snapshot());
        ephemeral.write(ACCESS_CREDENTIAL_KEY, "newer-access").expect("seed");

        let read = store.read().expect("snapshot");
        assert_eq!(read.access_credential, "access-1");
    }

    #[test]
    fn test_partial_snapshot_is_absent() {
        let (durable, _, store) = fixture();
        durable.write(PRINCIPAL_KEY, r#"{"id":"u1"}"#).expect("seed");
        assert_eq!(store.read(), None);

        durable.write(ACCESS_CREDENTIAL_KEY, "").expect("seed");
        assert_eq!(store.read(), None);
    }

    #[test]
    fn test_unparsable_principal_falls_through_to_ephemeral() {
        let (durable, ephemeral, store) = fixture();
        durable.write(PRINCIPAL_KEY, "{broken").expect("seed");
        durable.write(ACCESS_CREDENTIAL_KEY, "stale").expect("seed");
        ephemeral.write(PRINCIPAL_KEY, r#"{"id":"u3"}"#).expect("seed");
        ephemeral.write(ACCESS_CREDENTIAL_KEY, "fresh").expect("seed");

        let read = store.read().expect("snapshot");
        assert_eq!(read.access_credential, "fresh");
        assert_eq!(
            durable.read(PRINCIPAL_KEY).expect("read").as_deref(),
            Some(r#"{"id":"u3"}"#)
        );
    }

    #[test]
    fn test_principal_without_id_is_restored() {
        let (durable, _, store) = fixture();
        durable.write(PRINCIPAL_KEY, r#"{"name":"Ana","role":"superhost"}"#).expect("seed");
        durable.write(ACCESS_CREDENTIAL_KEY, "tok").expect("seed");

        let read = store.read().expect("snapshot");
        assert_eq!(read.principal.id, None);
        assert_eq!(read.principal.role, Some(Role::Other("superhost".to_string())));
        assert_eq!(read.principal.display_name(), "Ana");
    }

    #[test]
    fn test_status_reflects_each_tier() {
        let (durable, _, store) = fixture();
        store.write(&SessionSnapshot::new(Principal::new("u1"), "a", None));
        durable.remove(PRINCIPAL_KEY).expect("remove");

        let status = store.status();
        assert_eq!(
            status.durable,
            KeyPresence {
                principal: false,
                access_credential: true,
                refresh_credential: false,
            }
        );
        assert!(status.ephemeral.principal);
        assert!(!status.ephemeral.is_complete());
    }

    #[test]
    fn test_broken_durable_tier_still_serves_ephemeral() {
        let ephemeral = Arc::new(MemoryBackend::new("ephemeral"));
        let store = SessionStore::new(Arc::new(BrokenBackend), ephemeral.clone());

        assert!(!store.write(&snapshot()));
        assert_eq!(store.read(), Some(snapshot()));
        assert!(store.status().durable.is_empty());

        store.clear();
        assert!(ephemeral.is_empty());
    }

    #[test]
    fn test_corrupt_durable_file_is_repaired_and_cleared() {
        use crate::storage::backend::FileBackend;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").expect("seed corrupt file");

        let durable = Arc::new(FileBackend::new("durable", path.clone()));
        let ephemeral = Arc::new(MemoryBackend::new("ephemeral"));
        let store = SessionStore::new(durable, ephemeral.clone());
        let snap = snapshot();
        for (key, value) in snap.to_entries().expect("entries") {
            ephemeral.write(key, &value).expect("seed ephemeral");
        }

        assert_eq!(store.read(), Some(snap.clone()));
        assert_eq!(store.read_tier(Tier::Durable), Some(snap.clone()));

        store.clear();
        assert!(!path.exists());
        assert_eq!(store.read(), None);

        std::fs::write(&path, "{not json").expect("seed corrupt file");
        assert!(store.write(&snap));
        assert_eq!(store.read_tier(Tier::Durable), Some(snap));
    }
}
