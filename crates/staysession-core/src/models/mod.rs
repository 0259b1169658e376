//! Data types shared by the session cache and its storage.
//!
//! - `Principal`: the authenticated identity (id, role tag, display attributes)
//! - `CredentialPair`: access credential plus optional refresh credential
//! - `SessionSnapshot`: the triple persisted into each storage backend

pub mod principal;

pub use principal::{CredentialPair, Principal, PrincipalId, Role, SessionSnapshot};
