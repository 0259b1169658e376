//! HTTP client for the marketplace backend.
//!
//! This module provides the `ApiClient`, which attaches the session's
//! bearer credential to requests and feeds authorization failures and
//! refreshed credentials back into the session through the global hooks.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
