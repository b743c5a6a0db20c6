//! Client-side session controller for CloudVault.
//!
//! Holds the current access token in memory alongside a persisted copy,
//! attaches it to outgoing calls, and coordinates a single in-flight
//! refresh when a call is rejected as unauthenticated: concurrent callers
//! share the same refresh result instead of issuing duplicates.

pub mod client;
pub mod session;

pub use client::{AuthClient, ClientError};
pub use session::{FileTokenCache, MemoryTokenCache, SessionStore, TokenCache};
