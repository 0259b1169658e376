use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::expiry;
use super::hooks::{self, CredentialUpdate};
use super::token::{self, Claims};
use crate::models::{CredentialPair, Principal, SessionSnapshot};
use crate::storage::{SessionStore, StoreStatus};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid login data: {0}")]
    InvalidLoginData(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Authenticated,
    Unauthenticated,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Authenticated => write!(f, "authenticated"),
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}

/// In-memory session fields. Principal and credentials are set and
/// cleared together.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub state: SessionState,
    pub principal: Option<Principal>,
    pub credentials: Option<CredentialPair>,
}

impl SessionData {
    fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            principal: None,
            credentials: None,
        }
    }

    fn adopt(&mut self, snapshot: SessionSnapshot) {
        self.credentials = Some(snapshot.credentials());
        self.principal = Some(snapshot.principal);
        self.state = SessionState::Authenticated;
    }

    fn clear(&mut self) {
        self.principal = None;
        self.credentials = None;
        self.state = SessionState::Unauthenticated;
    }
}

struct Shared {
    data: Mutex<SessionData>,
    store: SessionStore,
    lookahead_secs: i64,
}

/// In-memory reflection of the authenticated principal and credentials,
/// kept in step with the redundant session store.
///
/// Every operation runs to completion synchronously; memory and the
/// durable backend agree as soon as `initialize`, `login` or `logout`
/// returns. One instance per process: constructing a cache (or logging
/// in) takes over the global hooks in [`hooks`].
#[derive(Clone)]
pub struct SessionCache {
    shared: Arc<Shared>,
}

impl SessionCache {
    /// Create an uninitialized cache and install its hooks
    pub fn new(store: SessionStore, lookahead_secs: i64) -> Self {
        let cache = Self {
            shared: Arc::new(Shared {
                data: Mutex::new(SessionData::new()),
                store,
                lookahead_secs,
            }),
        };
        cache.install_hooks();
        cache
    }

    /// Create the cache and restore the last persisted session
    pub fn start(store: SessionStore, lookahead_secs: i64) -> Self {
        let cache = Self::new(store, lookahead_secs);
        cache.initialize();
        cache
    }

    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.shared.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn install_hooks(&self) {
        let weak = Arc::downgrade(&self.shared);
        let on_credentials = move |update: CredentialUpdate| {
            weak.upgrade()
                .map(|shared| SessionCache { shared }.apply_update(update))
        };

        let weak = Arc::downgrade(&self.shared);
        let on_logout = move || match weak.upgrade() {
            Some(shared) => {
                SessionCache { shared }.logout();
                true
            }
            None => false,
        };

        hooks::install(Arc::new(on_credentials), Arc::new(on_logout));
    }

    /// Restore the session from storage. A snapshot whose access
    /// credential is expired or undecodable is discarded and storage is
    /// cleared.
    pub fn initialize(&self) {
        self.data().state = SessionState::Initializing;

        let Some(snapshot) = self.shared.store.read() else {
            debug!("No stored session found");
            self.data().clear();
            return;
        };

        if expiry::is_token_expired(&snapshot.access_credential) {
            info!(principal = %snapshot.principal.display_id(), "Stored credential expired, clearing session");
            self.shared.store.clear();
            self.data().clear();
            return;
        }

        debug!(principal = %snapshot.principal.display_id(), "Restored session from storage");
        self.data().adopt(snapshot);
    }

    fn reject(&self, reason: &'static str) -> Result<(), SessionError> {
        warn!(reason, "Rejected login data, clearing session");
        self.data().clear();
        self.shared.store.clear();
        Err(SessionError::InvalidLoginData(reason))
    }

    /// Adopt freshly obtained credentials. Missing principal or empty
    /// access credential leaves the cache logged out.
    pub fn login(
        &self,
        principal: Option<Principal>,
        access_credential: &str,
        refresh_credential: Option<String>,
    ) -> Result<(), SessionError> {
        let Some(principal) = principal else {
            return self.reject("missing principal");
        };
        if access_credential.trim().is_empty() {
            return self.reject("missing access credential");
        }

        let snapshot = SessionSnapshot::new(
            principal,
            access_credential,
            refresh_credential.filter(|r| !r.is_empty()),
        );

        {
            let mut data = self.data();
            data.adopt(snapshot.clone());
        }

        if !self.shared.store.write(&snapshot) {
            warn!("Session persisted to only some storage backends");
        }
        self.install_hooks();

        info!(
            principal = %snapshot.principal.display_id(),
            role = ?snapshot.principal.role,
            "Logged in"
        );
        Ok(())
    }

    /// Always succeeds. Clears memory and every storage backend.
    pub fn logout(&self) {
        self.data().clear();
        self.shared.store.clear();
        info!("Logged out");
    }

    /// Apply credentials pushed through the hook. Without a principal in
    /// the update, the current principal is kept.
    pub fn apply_update(&self, update: CredentialUpdate) -> Result<(), SessionError> {
        let principal = update.principal.or_else(|| self.principal());
        self.login(
            principal,
            &update.access_credential,
            update.refresh_credential,
        )
    }

    /// Replace the principal wholesale, keeping the current credentials
    pub fn replace_principal(&self, principal: Principal) -> Result<(), SessionError> {
        let Some(credentials) = self.credentials() else {
            return Err(SessionError::InvalidLoginData("no active credentials"));
        };
        self.login(
            Some(principal),
            &credentials.access_credential,
            credentials.refresh_credential,
        )
    }

    pub fn state(&self) -> SessionState {
        self.data().state
    }

    /// True until initialization has finished
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Uninitialized | SessionState::Initializing
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    pub fn principal(&self) -> Option<Principal> {
        self.data().principal.clone()
    }

    pub fn credentials(&self) -> Option<CredentialPair> {
        self.data().credentials.clone()
    }

    pub fn access_credential(&self) -> Option<String> {
        self.data()
            .credentials
            .as_ref()
            .map(|c| c.access_credential.clone())
    }

    pub fn refresh_credential(&self) -> Option<String> {
        self.data()
            .credentials
            .as_ref()
            .and_then(|c| c.refresh_credential.clone())
    }

    /// `Authorization` header value for outgoing requests
    pub fn authorization_header(&self) -> Option<String> {
        self.access_credential().map(|t| format!("Bearer {}", t))
    }

    /// Decoded claims of the current access credential
    pub fn claims(&self) -> Option<Claims> {
        self.access_credential().and_then(|t| token::decode(&t).ok())
    }

    /// Authenticated and the access credential has not expired
    pub fn has_valid_credential(&self) -> bool {
        self.is_authenticated() && !expiry::is_expired(self.claims().as_ref())
    }

    /// Authenticated and the access credential expires within the look-ahead window
    pub fn needs_refresh(&self) -> bool {
        self.is_authenticated()
            && expiry::is_expiring_soon(self.claims().as_ref(), self.shared.lookahead_secs)
    }

    pub fn time_until_expiry(&self) -> i64 {
        expiry::time_until_expiry(self.claims().as_ref())
    }

    pub fn store(&self) -> &SessionStore {
        &self.shared.store
    }

    pub fn store_status(&self) -> StoreStatus {
        self.shared.store.status()
    }

    pub fn current(&self) -> SessionData {
        self.data().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================
