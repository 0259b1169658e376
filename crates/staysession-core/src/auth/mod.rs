//! Session credential lifecycle.
//!
//! This module provides:
//! - `token`: unverified decoding of access credential claims
//! - `expiry`: fail-closed expiration checks over those claims
//! - `SessionCache`: the in-memory session, restored from and persisted to `SessionStore`
//! - `hooks`: process-wide slots the HTTP layer uses to push credentials or force a logout

pub mod expiry;
pub mod hooks;
pub mod session;
pub mod token;

pub use hooks::CredentialUpdate;
pub use session::{SessionCache, SessionData, SessionError, SessionState};
pub use token::{Claims, DecodeError};
