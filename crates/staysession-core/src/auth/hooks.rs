//! Process-wide hook slots for pushing session changes from the HTTP layer.
//!
//! The HTTP layer never holds a reference to the session cache. Instead the
//! cache installs two handlers here: one accepting refreshed credentials and
//! one forcing a logout (e.g. after a 401 response).
//!
//! Invariant: exactly one `SessionCache` exists per process. Every slot holds
//! a single handler, and installing replaces the previous one, so only the
//! most recently constructed (or most recently logged-in) cache receives
//! hook calls. Handlers keep a weak reference to their cache; once that cache
//! is dropped, invoking a hook behaves as if nothing were installed.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::session::SessionError;
use crate::models::Principal;

/// Credentials pushed from outside the cache, typically after a refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialUpdate {
    /// `None` keeps the principal currently held by the cache
    pub principal: Option<Principal>,
    pub access_credential: String,
    pub refresh_credential: Option<String>,
}

impl CredentialUpdate {
    pub fn refreshed(access_credential: String, refresh_credential: Option<String>) -> Self {
        Self {
            principal: None,
            access_credential,
            refresh_credential,
        }
    }
}

/// Returns `None` when the owning cache no longer exists
pub type CredentialHandler =
    dyn Fn(CredentialUpdate) -> Option<Result<(), SessionError>> + Send + Sync;

/// Returns `false` when the owning cache no longer exists
pub type LogoutHandler = dyn Fn() -> bool + Send + Sync;

/// A single-handler slot. Installing overwrites.
pub struct HookSlot<F: ?Sized> {
    handler: Mutex<Option<Arc<F>>>,
}

impl<F: ?Sized> HookSlot<F> {
    pub const fn new() -> Self {
        Self {
            handler: Mutex::new(None),
        }
    }

    /// Install `handler`, returning the one it replaced
    pub fn install(&self, handler: Arc<F>) -> Option<Arc<F>> {
        let mut slot = self.handler.lock().unwrap_or_else(PoisonError::into_inner);
        slot.replace(handler)
    }

    pub fn take(&self) -> Option<Arc<F>> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Clone of the current handler. The slot lock is released before the
    /// caller runs it, so handlers may reinstall hooks.
    pub fn get(&self) -> Option<Arc<F>> {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_installed(&self) -> bool {
        self.handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<F: ?Sized> Default for HookSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

static CREDENTIAL_HOOK: HookSlot<CredentialHandler> = HookSlot::new();
static LOGOUT_HOOK: HookSlot<LogoutHandler> = HookSlot::new();

/// Install both handlers, replacing whatever a previous cache installed
pub fn install(credentials: Arc<CredentialHandler>, logout: Arc<LogoutHandler>) {
    let replaced = CREDENTIAL_HOOK.install(credentials).is_some();
    LOGOUT_HOOK.install(logout);
    debug!(replaced, "Session hooks installed");
}

pub fn uninstall() {
    CREDENTIAL_HOOK.take();
    LOGOUT_HOOK.take();
}

pub fn is_installed() -> bool {
    CREDENTIAL_HOOK.is_installed() && LOGOUT_HOOK.is_installed()
}

/// Push credentials into the live cache. `None` if no cache is live.
pub fn push_credentials(update: CredentialUpdate) -> Option<Result<(), SessionError>> {
    let handler = CREDENTIAL_HOOK.get()?;
    handler(update)
}

/// Force the live cache to log out. `false` if no cache is live.
pub fn force_logout() -> bool {
    match LOGOUT_HOOK.get() {
        Some(handler) => handler(),
        None => false,
    }
}

#[cfg(test)]
static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that construct a cache or touch the global slots
#[cfg(test)]
pub(crate) fn serial_guard() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}
