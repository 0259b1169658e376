//! Client-side session lifecycle for the staysession booking front end.
//!
//! The crate keeps the authenticated principal and its credentials in memory,
//! persists them redundantly across a durable and an ephemeral storage
//! backend, and discards credentials that decode as expired.
//!
//! - [`auth`]: credential decoding, expiration checks, the session cache and its hooks
//! - [`storage`]: storage backends and the replicated session snapshot store
//! - [`models`]: principal, credential pair, snapshot
//! - [`api`]: thin HTTP client wired to the session hooks
//! - [`config`]: on-disk configuration and backend selection

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

pub use auth::{SessionCache, SessionError, SessionState};
pub use config::Config;
pub use models::{CredentialPair, Principal, Role, SessionSnapshot};
pub use storage::{SessionStore, StoreStatus};
