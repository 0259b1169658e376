//! Redundant persistence for the session snapshot.
//!
//! This module provides:
//! - `StorageBackend`: flat string key/value storage (memory, JSON file, OS keychain)
//! - `ReplicatedStore`: one record kept in several backends with read-repair
//! - `SessionStore`: the session snapshot over a durable and an ephemeral tier
//!
//! Storage failures are logged and swallowed here. The redundant layout
//! assumes any single backend may be broken.

pub mod backend;
pub mod keychain;
pub mod replicated;
pub mod snapshot;

pub use backend::{FileBackend, MemoryBackend, StorageBackend, StorageError};
pub use keychain::KeyringBackend;
pub use replicated::{Record, ReplicaStatus, ReplicatedStore};
pub use snapshot::{KeyPresence, SessionStore, StoreStatus, Tier};
